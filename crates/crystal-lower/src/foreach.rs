//! `foreach` lowering.
//!
//! The target iterates with `map`, whose function takes exactly the item,
//! and `fold`, whose function takes the item and an accumulator and
//! returns the next accumulator.
//!
//! A named function needs nothing and becomes `map(f, list)`. An anonymous
//! body, which may take the item index and read captured variables, runs
//! under `fold` with a record accumulator:
//!
//! ```text
//! { results: list<ret>[n], index: uint, closure_vars: { .. } }
//! ```
//!
//! `index` and `closure_vars` are only present when used. The body reads
//! them back into locals, and each `return x` becomes a return of the next
//! accumulator with `x` appended to `results`. The call site becomes
//! `fold(f, list, initial).results`.

use std::collections::HashSet;

use indexmap::IndexMap;

use crystal_ast::{Ast, ChainOp, Ident, Lit, NodeId, NodeKind, Protect, Type, VarDecl};
use crystal_diag::Diagnostic;
use crystal_types::sizes::max_list_size;
use tracing::debug;

const ACCUMULATOR: &str = "fold_map";

/// Rewrite every `foreach` into `map` or `fold`. Runs after
/// globalization, when each foreach function is a reference to a
/// top-level function.
pub fn lower_foreach(ast: &mut Ast) -> Result<(), Diagnostic> {
    let mut sites = Vec::new();
    let root = ast.root();
    ast.walk(root, &mut |n| {
        if matches!(ast.kind(n), NodeKind::Foreach { .. }) {
            sites.push(n);
        }
        true
    });

    let mut lowered = HashSet::new();
    for site in sites {
        let NodeKind::Foreach { list, func, captured } = ast.kind(site).clone() else {
            continue;
        };
        let Type::Func(fref) = ast.ty(func).clone() else {
            return Err(Diagnostic::internal("foreach function was not globalized").at_line(ast.line(site)));
        };
        let anon = ast.func(fref.def).is_some_and(|f| f.anon);
        let ty = ast.ty(site).clone();
        if !anon {
            let callee = builtin(ast, "map");
            ast.reset(site, NodeKind::Call { callee, args: vec![func, list] }, ty);
            continue;
        }

        let accumulator = if lowered.insert(fref.def) {
            to_fold_body(ast, fref.def)?
        } else {
            accumulator_type(ast, fref.def)?
        };
        let initial = initial_accumulator(ast, fref.def, &accumulator, &captured)?;
        let callee = builtin(ast, "fold");
        let fold = ast.alloc_typed(
            NodeKind::Call {
                callee,
                args: vec![func, list, initial],
            },
            accumulator,
        );
        let key = text(ast, "results");
        ast.reset(
            site,
            NodeKind::Index {
                dot: true,
                expr: Some(fold),
                key,
            },
            ty,
        );
    }
    Ok(())
}

/// Type of the accumulator argument of an already lowered body.
fn accumulator_type(ast: &Ast, def: NodeId) -> Result<Type, Diagnostic> {
    ast.func(def)
        .and_then(|f| f.args.get(1))
        .map(|&arg| ast.ty(arg).clone())
        .ok_or_else(|| Diagnostic::internal("fold body without accumulator"))
}

/// Rewrite an anonymous foreach body to take and return the accumulator.
/// Returns the accumulator type.
fn to_fold_body(ast: &mut Ast, def: NodeId) -> Result<Type, Diagnostic> {
    let Some(func) = ast.func(def).cloned() else {
        return Err(Diagnostic::internal("expected a function definition"));
    };
    let ret = ast.ty(def).clone();
    let capacity = match func.foreach_list_size {
        Some(size) => size,
        None => max_list_size(&ret).map_err(|e| e.or_at_line(ast.line(def)))?,
    };

    // The optional second argument is the index; captured variables follow.
    let mut index = None;
    let mut closure_vars = IndexMap::new();
    for (pos, &arg) in func.args.iter().enumerate().skip(1) {
        let NodeKind::Arg(a) = ast.kind(arg) else {
            continue;
        };
        let name = a.name.clone();
        if a.closure.is_some() {
            closure_vars.insert(name, ast.ty(arg).clone());
        } else if pos == 1 {
            index = Some(name);
        }
    }

    let mut fields = IndexMap::new();
    fields.insert("results".to_string(), Type::list(ret.clone(), Some(capacity)));
    if index.is_some() {
        fields.insert("index".to_string(), Type::Uint);
    }
    if !closure_vars.is_empty() {
        fields.insert("closure_vars".to_string(), Type::map(closure_vars.clone()));
    }
    let acc_ty = Type::map(fields);
    let acc = ast.arg(ACCUMULATOR, acc_ty.clone());

    // Locals for the index and every captured variable.
    let mut locals = Vec::new();
    let mut index_decl = None;
    for &arg in &func.args[1..] {
        let Some(name) = ast.decl_name(arg).map(str::to_string) else {
            continue;
        };
        let ty = ast.ty(arg).clone();
        let value = if closure_vars.contains_key(&name) {
            let vars = field(ast, acc, &acc_ty, "closure_vars");
            let vars_ty = ast.ty(vars).clone();
            field_of(ast, vars, &vars_ty, &name)
        } else {
            field(ast, acc, &acc_ty, "index")
        };
        let decl = ast.alloc_typed(
            NodeKind::VarDecl(VarDecl {
                id: name.clone(),
                protect: Protect::Const,
                expr: value,
            }),
            ty,
        );
        relink(ast, func.body, arg, decl);
        if index.as_deref() == Some(name.as_str()) {
            index_decl = Some((name, decl));
        }
        locals.push(decl);
    }
    ast.stmts_mut(func.body).splice(0..0, locals);

    if let Some(f) = ast.func_mut(def) {
        f.args.truncate(1);
        f.args.push(acc);
    }

    // Every return yields the next accumulator.
    let mut returns = Vec::new();
    ast.walk(func.body, &mut |n| match ast.kind(n) {
        NodeKind::Func(_) => false,
        NodeKind::Return { .. } => {
            returns.push(n);
            false
        }
        _ => true,
    });
    for stmt in returns {
        let NodeKind::Return { expr } = *ast.kind(stmt) else {
            continue;
        };
        let next = next_accumulator(ast, acc, &acc_ty, expr, capacity, index_decl.as_ref());
        ast.reset(stmt, NodeKind::Return { expr: next }, acc_ty.clone());
    }
    ast.set_ty(def, acc_ty.clone());
    debug!(
        function = func.display_name(),
        capacity,
        captured = closure_vars.len(),
        "lowered foreach body to fold"
    );
    Ok(acc_ty)
}

/// ```text
/// {
///     results: unwrap-panic(as-max-len?(append(fold_map.results, expr), capacity)),
///     index: index + u1,
///     closure_vars: fold_map.closure_vars,
/// }
/// ```
fn next_accumulator(
    ast: &mut Ast,
    acc: NodeId,
    acc_ty: &Type,
    expr: NodeId,
    capacity: u128,
    index: Option<&(String, NodeId)>,
) -> NodeId {
    let results_ty = acc_ty
        .map_fields()
        .and_then(|f| f.get("results"))
        .cloned()
        .unwrap_or_default();
    let results = field(ast, acc, acc_ty, "results");
    let appended = call(ast, "append", vec![results, expr], results_ty.clone());
    let max = ast.alloc_typed(NodeKind::Lit(Lit::Uint(capacity)), Type::Uint);
    let bounded = call(ast, "as-max-len?", vec![appended, max], Type::optional(results_ty.clone()));
    let unwrapped = call(ast, "unwrap-panic", vec![bounded], results_ty);

    let mut record = IndexMap::new();
    record.insert("results".to_string(), unwrapped);
    if let Some((name, decl)) = index {
        let current = ast.alloc_typed(
            NodeKind::Id(Ident {
                name: name.clone(),
                decl: Some(*decl),
                bind: Vec::new(),
            }),
            Type::Uint,
        );
        let one = ast.alloc_typed(NodeKind::Lit(Lit::Uint(1)), Type::Uint);
        let next = ast.alloc_typed(
            NodeKind::Chain {
                op: ChainOp::Add,
                operands: vec![current, one],
            },
            Type::Uint,
        );
        record.insert("index".to_string(), next);
    }
    if acc_ty.map_fields().is_some_and(|f| f.contains_key("closure_vars")) {
        let vars = field(ast, acc, acc_ty, "closure_vars");
        record.insert("closure_vars".to_string(), vars);
    }
    ast.alloc_typed(NodeKind::Lit(Lit::Map(record)), acc_ty.clone())
}

/// `{ index: u0, results: [], closure_vars: { arg: value, .. } }`
fn initial_accumulator(ast: &mut Ast, def: NodeId, acc_ty: &Type, captured: &[NodeId]) -> Result<NodeId, Diagnostic> {
    let fields = acc_ty
        .map_fields()
        .cloned()
        .ok_or_else(|| Diagnostic::internal("accumulator is not a record"))?;
    let mut record = IndexMap::new();
    for (name, ty) in &fields {
        let value = match name.as_str() {
            "index" => ast.alloc_typed(NodeKind::Lit(Lit::Uint(0)), Type::Uint),
            "results" => ast.alloc_typed(NodeKind::Lit(Lit::List(Vec::new())), ty.clone()),
            _ => {
                let names: Vec<String> = ty.map_fields().map(|f| f.keys().cloned().collect()).unwrap_or_default();
                if names.len() != captured.len() {
                    return Err(Diagnostic::internal(format!(
                        "foreach over '{}' passes {} captured values for {} variables",
                        ast.func(def).map(|f| f.display_name()).unwrap_or_default(),
                        captured.len(),
                        names.len()
                    )));
                }
                let vars = names.into_iter().zip(captured.iter().copied()).collect();
                ast.alloc_typed(NodeKind::Lit(Lit::Map(vars)), ty.clone())
            }
        };
        record.insert(name.clone(), value);
    }
    Ok(ast.alloc_typed(NodeKind::Lit(Lit::Map(record)), acc_ty.clone()))
}

/// Point identifiers declared by `old` at `new`.
fn relink(ast: &mut Ast, body: NodeId, old: NodeId, new: NodeId) {
    let mut uses = Vec::new();
    ast.walk(body, &mut |n| {
        if matches!(ast.kind(n), NodeKind::Id(Ident { decl: Some(d), .. }) if *d == old) {
            uses.push(n);
        }
        true
    });
    for id in uses {
        if let NodeKind::Id(ident) = ast.kind_mut(id) {
            ident.decl = Some(new);
        }
    }
}

fn builtin(ast: &mut Ast, name: &str) -> NodeId {
    ast.alloc_typed(
        NodeKind::Id(Ident {
            name: name.to_string(),
            decl: None,
            bind: Vec::new(),
        }),
        Type::Builtin(name.to_string()),
    )
}

fn call(ast: &mut Ast, name: &str, args: Vec<NodeId>, ty: Type) -> NodeId {
    let callee = builtin(ast, name);
    ast.alloc_typed(NodeKind::Call { callee, args }, ty)
}

fn text(ast: &mut Ast, s: &str) -> NodeId {
    let len = s.chars().count() as u128;
    ast.alloc_typed(NodeKind::Lit(Lit::Str(s.to_string())), Type::String(Some(len)))
}

/// `fold_map.<name>`
fn field(ast: &mut Ast, acc: NodeId, acc_ty: &Type, name: &str) -> NodeId {
    let reference = ast.alloc_typed(
        NodeKind::Id(Ident {
            name: ACCUMULATOR.to_string(),
            decl: Some(acc),
            bind: Vec::new(),
        }),
        acc_ty.clone(),
    );
    field_of(ast, reference, acc_ty, name)
}

fn field_of(ast: &mut Ast, expr: NodeId, ty: &Type, name: &str) -> NodeId {
    let field_ty = ty.map_fields().and_then(|f| f.get(name)).cloned().unwrap_or_default();
    let key = text(ast, name);
    ast.alloc_typed(
        NodeKind::Index {
            dot: true,
            expr: Some(expr),
            key,
        },
        field_ty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globalize_inner_functions;
    use crystal_ast::Visibility::*;
    use crystal_infer::{InferOptions, determine_types, validate_functions};

    fn lower(ast: &mut Ast) {
        let order = validate_functions(ast).unwrap();
        determine_types(ast, order, &InferOptions::default(), &mut Vec::new(), None).unwrap();
        globalize_inner_functions(ast).unwrap();
        lower_foreach(ast).unwrap();
    }

    fn numbers(ast: &mut Ast) -> NodeId {
        let items: Vec<_> = (1..=3).map(|n| ast.uint(n)).collect();
        ast.list(items)
    }

    fn callee_name(ast: &Ast, call: NodeId) -> Option<&str> {
        match ast.kind(call) {
            NodeKind::Call { callee, .. } => ast.decl_name(*callee),
            _ => None,
        }
    }

    #[test]
    fn named_functions_become_map() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Uint);
        let xid = ast.id("x");
        let two = ast.uint(2);
        let dbl = ast.chain(ChainOp::Mul, xid, two);
        let r = ast.ret(dbl);
        let double = ast.function(Private, "double", vec![x], vec![r]);
        let list = numbers(&mut ast);
        let fref = ast.id("double");
        let each = ast.foreach(list, fref);
        let r2 = ast.ret(each);
        let f = ast.function(Private, "all", vec![], vec![r2]);
        ast.push_definition(double);
        ast.push_definition(f);
        lower(&mut ast);

        assert_eq!(callee_name(&ast, each), Some("map"));
        let NodeKind::Call { args, .. } = ast.kind(each) else {
            panic!("map call");
        };
        assert_eq!(args, &vec![fref, list]);
        assert_eq!(ast.ty(each), &Type::list(Type::Uint, Some(3)));
    }

    #[test]
    fn anonymous_bodies_fold_into_results() {
        let mut ast = Ast::new();
        let list = numbers(&mut ast);
        let n = ast.arg("n", Type::Unknown);
        let i = ast.arg("i", Type::Unknown);
        let (nid, iid) = (ast.id("n"), ast.id("i"));
        let sum = ast.chain(ChainOp::Add, nid, iid);
        let r = ast.ret(sum);
        let body = ast.anon_func(vec![n, i], vec![r]);
        let each = ast.foreach(list, body);
        let r2 = ast.ret(each);
        let f = ast.function(Private, "offsets", vec![], vec![r2]);
        ast.push_definition(f);
        lower(&mut ast);

        let NodeKind::Index { expr: Some(fold), .. } = ast.kind(each) else {
            panic!("results projection");
        };
        assert_eq!(callee_name(&ast, *fold), Some("fold"));

        let def = ast.func(body).unwrap();
        let arg_names: Vec<_> = def.args.iter().filter_map(|&a| ast.decl_name(a)).collect();
        assert_eq!(arg_names, vec!["n", ACCUMULATOR]);
        let acc_ty = Type::map([
            ("results", Type::list(Type::Uint, Some(3))),
            ("index", Type::Uint),
        ]);
        assert_eq!(ast.ty(body), &acc_ty);

        // `const i = fold_map.index;` leads the body.
        let first = ast.stmts(def.body)[0];
        assert_eq!(ast.decl_name(first), Some("i"));
        let NodeKind::Return { expr } = ast.kind(ast.stmts(def.body)[1]) else {
            panic!("return kept");
        };
        let Some(Lit::Map(fields)) = ast.lit(*expr) else {
            panic!("return of the next accumulator");
        };
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["results", "index"]);
        assert_eq!(callee_name(&ast, fields["results"]), Some("unwrap-panic"));
    }

    #[test]
    fn fold_results_match_the_map_form() {
        // all() maps the named double(); doubled() folds the same body
        // written as an anonymous function.
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Uint);
        let xid = ast.id("x");
        let two = ast.uint(2);
        let dbl = ast.chain(ChainOp::Mul, xid, two);
        let r = ast.ret(dbl);
        let double = ast.function(Private, "double", vec![x], vec![r]);
        let list = numbers(&mut ast);
        let fref = ast.id("double");
        let mapped = ast.foreach(list, fref);
        let r2 = ast.ret(mapped);
        let all = ast.function(Private, "all", vec![], vec![r2]);

        let list = numbers(&mut ast);
        let n = ast.arg("n", Type::Unknown);
        let nid = ast.id("n");
        let two = ast.uint(2);
        let dbl = ast.chain(ChainOp::Mul, nid, two);
        let r = ast.ret(dbl);
        let body = ast.anon_func(vec![n], vec![r]);
        let folded = ast.foreach(list, body);
        let r3 = ast.ret(folded);
        let doubled = ast.function(Private, "doubled", vec![], vec![r3]);
        for def in [double, all, doubled] {
            ast.push_definition(def);
        }
        lower(&mut ast);

        let map_ty = Type::list(Type::Uint, Some(3));
        assert_eq!(callee_name(&ast, mapped), Some("map"));
        assert_eq!(ast.ty(mapped), &map_ty);
        assert_eq!(ast.ty(folded), &map_ty);

        let NodeKind::Index { expr: Some(fold), .. } = ast.kind(folded) else {
            panic!("results projection");
        };
        assert_eq!(callee_name(&ast, *fold), Some("fold"));
        let results = ast.ty(*fold).map_fields().and_then(|f| f.get("results"));
        assert_eq!(results, Some(&map_ty));
    }

    #[test]
    fn captured_values_start_in_the_initial_accumulator() {
        let mut ast = Ast::new();
        let step = ast.arg("step", Type::Uint);
        let list = numbers(&mut ast);
        let n = ast.arg("n", Type::Unknown);
        let (nid, sid) = (ast.id("n"), ast.id("step"));
        let sum = ast.chain(ChainOp::Add, nid, sid);
        let r = ast.ret(sum);
        let body = ast.anon_func(vec![n], vec![r]);
        let each = ast.foreach(list, body);
        let r2 = ast.ret(each);
        let f = ast.function(Private, "shift", vec![step], vec![r2]);
        ast.push_definition(f);
        lower(&mut ast);

        let NodeKind::Index { expr: Some(fold), .. } = ast.kind(each) else {
            panic!("results projection");
        };
        let NodeKind::Call { args, .. } = ast.kind(*fold) else {
            panic!("fold call");
        };
        let Some(Lit::Map(initial)) = ast.lit(args[2]) else {
            panic!("initial accumulator");
        };
        assert_eq!(initial.keys().collect::<Vec<_>>(), vec!["results", "closure_vars"]);
        let Some(Lit::Map(vars)) = ast.lit(initial["closure_vars"]) else {
            panic!("closure vars");
        };
        assert_eq!(vars.keys().collect::<Vec<_>>(), vec!["clss-step"]);
        assert_eq!(ast.decl_name(vars["clss-step"]), Some("step"));
    }
}
