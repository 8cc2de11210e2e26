//! Move nested functions to the top level.
//!
//! The target has no nested or anonymous functions. Every function
//! declared inside another one is renamed to the unique name picked
//! during function validation, detached from its body and inserted at the
//! root just before the top-level definition that contained it.
//!
//! Variables a nested function reads from enclosing functions become
//! trailing arguments. Calls to the function in its declaring scope pass
//! the captured values along. Anonymous functions are replaced by a
//! reference to their globalized form; the values they capture are kept on
//! the `foreach` that runs them.

use std::collections::HashSet;

use crystal_ast::{Ast, FuncRef, Ident, NodeId, NodeKind, Type};
use crystal_diag::{Category, Diagnostic};
use crystal_infer::generate_id_name;
use tracing::debug;

/// Globalize the nested functions of every top-level function.
///
/// Must run after type inference: captured variables are found through
/// the declaration links inference sets on identifiers.
pub fn globalize_inner_functions(ast: &mut Ast) -> Result<(), Diagnostic> {
    let root = ast.root();
    let mut insertions = Vec::new();

    for (idx, def) in ast.definitions().to_vec().into_iter().enumerate() {
        let Some(body) = ast.func(def).map(|f| f.body) else {
            continue;
        };
        let mut globalizer = Globalizer {
            ast: &mut *ast,
            moved: Vec::new(),
        };
        globalizer.scope(body, &[root, def])?;
        let mut moved = globalizer.moved;
        if !moved.is_empty() {
            moved.reverse();
            insertions.push((idx, moved));
        }
    }

    for (idx, moved) in insertions.into_iter().rev() {
        ast.stmts_mut(root).splice(idx..idx, moved);
    }
    Ok(())
}

struct Globalizer<'a> {
    ast: &'a mut Ast,
    /// Functions taken out of their bodies, innermost first.
    moved: Vec<NodeId>,
}

impl Globalizer<'_> {
    /// Globalize the functions declared in `body`. `scopes` ends with the
    /// scope `body` belongs to.
    fn scope(&mut self, body: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        for stmt in self.ast.stmts(body).to_vec() {
            self.visit(stmt, body, scopes)?;
        }
        Ok(())
    }

    fn visit(&mut self, node: NodeId, parent: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        match self.ast.kind(node) {
            NodeKind::If(stmt) => {
                let mut bodies = vec![stmt.body];
                bodies.extend(stmt.elsif.iter().map(|e| e.body));
                bodies.extend(stmt.else_body);
                for branch in bodies {
                    let mut inner = scopes.to_vec();
                    inner.push(branch);
                    self.scope(branch, &inner)?;
                }
                Ok(())
            }
            NodeKind::Scope { body, .. } => {
                let body = *body;
                let mut inner = scopes.to_vec();
                inner.push(body);
                self.scope(body, &inner)
            }
            NodeKind::Func(_) => self.function(node, parent, scopes),
            NodeKind::Id(_) => Ok(()),
            _ => {
                for child in self.ast.children(node) {
                    self.visit(child, node, scopes)?;
                }
                Ok(())
            }
        }
    }

    fn function(&mut self, func: NodeId, parent: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let mut inner = scopes.to_vec();
        inner.push(func);
        let body = self
            .ast
            .func(func)
            .map(|f| f.body)
            .ok_or_else(|| Diagnostic::internal("expected a function definition"))?;
        self.scope(body, &inner)?;

        let def = self.ast.func(func).cloned().unwrap_or_default();
        let name = def
            .globalized_name
            .clone()
            .ok_or_else(|| Diagnostic::internal("no globalized name").at_line(self.ast.line(func)))?;

        let captured = self.capture(func, body, scopes)?;
        if let Some(def) = self.ast.func_mut(func) {
            def.name = Some(name.clone());
            def.globalized = true;
            def.globalized_name = None;
        }
        debug!(function = %name, captured = captured.len(), "globalized inner function");

        let reference = Type::Func(FuncRef {
            def: func,
            implementor: None,
        });
        if def.anon {
            let id = self.ast.alloc_typed(
                NodeKind::Id(Ident {
                    name: name.clone(),
                    decl: None,
                    bind: Vec::new(),
                }),
                reference,
            );
            self.ast.replace_child(parent, func, id);
            if !captured.is_empty() {
                let values: Vec<NodeId> = captured.iter().map(|&decl| self.value_of(decl)).collect();
                match self.ast.kind_mut(parent) {
                    NodeKind::Foreach { captured, .. } => *captured = values,
                    _ => {
                        return Err(Diagnostic::error(
                            Category::NotSupported,
                            "anonymous functions may only use closure as the body of foreach",
                        )
                        .at_line(self.ast.line(func)));
                    }
                }
            }
        } else {
            let nop = self.ast.alloc(NodeKind::Nop);
            self.ast.replace_child(parent, func, nop);
            let declaring_scope = scopes.last().copied().unwrap_or(parent);
            self.redirect_calls(declaring_scope, func, &name, &captured);
        }
        self.moved.push(func);
        Ok(())
    }

    /// Turn the variables `func` reads from enclosing functions into
    /// trailing arguments. Returns the captured declarations in argument
    /// order.
    fn capture(&mut self, func: NodeId, body: NodeId, scopes: &[NodeId]) -> Result<Vec<NodeId>, Diagnostic> {
        let mut local = HashSet::new();
        self.ast.walk_from(func, &mut |n| {
            local.insert(n);
            true
        });
        let globals: HashSet<NodeId> = self.ast.definitions().iter().copied().collect();

        let mut uses = Vec::new();
        self.ast.walk(body, &mut |n| {
            if let NodeKind::Id(Ident { decl: Some(decl), .. }) = self.ast.kind(n)
                && !local.contains(decl)
                && !globals.contains(decl)
            {
                uses.push((n, *decl));
            }
            true
        });

        // Name prefix from the declaring scopes, the global scope included.
        let mut captured: Vec<(NodeId, NodeId)> = Vec::new();
        for (id, decl) in uses {
            let arg = match captured.iter().find(|(d, _)| *d == decl) {
                Some(&(_, arg)) => arg,
                None => {
                    let old = self.ast.decl_name(decl).unwrap_or_default().to_string();
                    let args = self.ast.func(func).map(|f| f.args.clone()).unwrap_or_default();
                    let new_name = generate_id_name(self.ast, &old, scopes, &args);
                    let ty = self.ast.ty(decl).clone();
                    let arg = self.ast.arg(&new_name, ty);
                    if let NodeKind::Arg(a) = self.ast.kind_mut(arg) {
                        a.closure = Some(old);
                    }
                    if let Some(def) = self.ast.func_mut(func) {
                        def.args.push(arg);
                    }
                    captured.push((decl, arg));
                    arg
                }
            };
            let new_name = self.ast.decl_name(arg).unwrap_or_default().to_string();
            if let NodeKind::Id(ident) = self.ast.kind_mut(id) {
                ident.name = new_name;
                ident.decl = Some(arg);
            }
        }
        Ok(captured.into_iter().map(|(decl, _)| decl).collect())
    }

    /// Fresh identifier reading the value of `decl` where it is declared.
    fn value_of(&mut self, decl: NodeId) -> NodeId {
        let name = self.ast.decl_name(decl).unwrap_or_default().to_string();
        let ty = self.ast.ty(decl).clone();
        self.ast.alloc_typed(
            NodeKind::Id(Ident {
                name,
                decl: Some(decl),
                bind: Vec::new(),
            }),
            ty,
        )
    }

    /// Point every reference to `func` within `scope` at its new name and
    /// pass the captured values to calls.
    fn redirect_calls(&mut self, scope: NodeId, func: NodeId, name: &str, captured: &[NodeId]) {
        let refers = |ast: &Ast, n: NodeId| matches!(ast.ty(n), Type::Func(r) if r.def == func);
        let mut calls = Vec::new();
        let mut refs = Vec::new();
        self.ast.walk(scope, &mut |n| {
            match self.ast.kind(n) {
                NodeKind::Call { callee, .. } if refers(self.ast, *callee) => calls.push(n),
                NodeKind::Id(_) if refers(self.ast, n) => refs.push(n),
                _ => {}
            }
            true
        });

        for id in refs {
            if let NodeKind::Id(ident) = self.ast.kind_mut(id) {
                ident.name = name.to_string();
            }
        }
        for call in calls {
            let values: Vec<NodeId> = captured.iter().map(|&decl| self.value_of(decl)).collect();
            if let NodeKind::Call { args, .. } = self.ast.kind_mut(call) {
                args.extend(values);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_ast::{ChainOp, Protect, Visibility::*};
    use crystal_infer::{InferOptions, determine_types, validate_functions};

    fn infer(ast: &mut Ast) {
        let order = validate_functions(ast).unwrap();
        determine_types(ast, order, &InferOptions::default(), &mut Vec::new(), None).unwrap();
    }

    fn root_names(ast: &Ast) -> Vec<String> {
        ast.definitions()
            .iter()
            .filter_map(|&d| ast.func(d).and_then(|f| f.name.clone()))
            .collect()
    }

    /// ```text
    /// function outer(uint x) {
    ///     const base = u10;
    ///     function helper(uint v) { return v + base + x; }
    ///     return helper(u1) + helper(u2);
    /// }
    /// ```
    fn outer_with_helper(ast: &mut Ast) -> (NodeId, NodeId, Vec<NodeId>) {
        let x = ast.arg("x", Type::Uint);
        let ten = ast.uint(10);
        let base = ast.var_decl("base", Protect::Const, ten);

        let v = ast.arg("v", Type::Uint);
        let (vid, bid, xid) = (ast.id("v"), ast.id("base"), ast.id("x"));
        let sum = ast.chain(ChainOp::Add, vid, bid);
        let sum = ast.chain(ChainOp::Add, sum, xid);
        let r = ast.ret(sum);
        let helper = ast.function(Private, "helper", vec![v], vec![r]);

        let (one, two) = (ast.uint(1), ast.uint(2));
        let c1 = ast.call("helper", vec![one]);
        let c2 = ast.call("helper", vec![two]);
        let total = ast.chain(ChainOp::Add, c1, c2);
        let r2 = ast.ret(total);
        let outer = ast.function(Private, "outer", vec![x], vec![base, helper, r2]);
        ast.push_definition(outer);
        (outer, helper, vec![c1, c2])
    }

    #[test]
    fn captured_variables_become_trailing_arguments() {
        let mut ast = Ast::new();
        let (outer, helper, calls) = outer_with_helper(&mut ast);
        infer(&mut ast);
        globalize_inner_functions(&mut ast).unwrap();

        assert_eq!(root_names(&ast), vec!["inner-outer-helper", "outer"]);
        assert_eq!(ast.definitions()[1], outer);

        let def = ast.func(helper).unwrap();
        assert!(def.globalized);
        let arg_names: Vec<_> = def.args.iter().filter_map(|&a| ast.decl_name(a)).collect();
        assert_eq!(arg_names, vec!["v", "clso-base", "clso-x"]);

        for call in calls {
            let NodeKind::Call { callee, args } = ast.kind(call) else {
                panic!("call rewritten");
            };
            assert_eq!(ast.decl_name(*callee), Some("inner-outer-helper"));
            let passed: Vec<_> = args.iter().filter_map(|&a| ast.decl_name(a)).collect();
            assert_eq!(passed, vec!["base", "x"]);
        }
    }

    #[test]
    fn bodies_refer_to_the_new_arguments() {
        let mut ast = Ast::new();
        let (_, helper, _) = outer_with_helper(&mut ast);
        infer(&mut ast);
        globalize_inner_functions(&mut ast).unwrap();

        let def = ast.func(helper).unwrap();
        let mut names = Vec::new();
        ast.walk(def.body, &mut |n| {
            if let NodeKind::Id(ident) = ast.kind(n) {
                names.push(ident.name.clone());
            }
            true
        });
        assert_eq!(names, vec!["v", "clso-base", "clso-x"]);
    }

    #[test]
    fn the_declaring_body_keeps_no_function() {
        let mut ast = Ast::new();
        let (outer, _, _) = outer_with_helper(&mut ast);
        infer(&mut ast);
        globalize_inner_functions(&mut ast).unwrap();
        ast.remove_nops();
        let body = ast.func(outer).unwrap().body;
        assert!(
            ast.stmts(body)
                .iter()
                .all(|&s| !matches!(ast.kind(s), NodeKind::Func(_)))
        );
        assert_eq!(ast.stmts(body).len(), 2);
    }

    #[test]
    fn functions_without_captures_keep_their_arguments() {
        let mut ast = Ast::new();
        let v = ast.arg("v", Type::Int);
        let vid = ast.id("v");
        let r = ast.ret(vid);
        let same = ast.function(Private, "same", vec![v], vec![r]);
        let three = ast.int(3);
        let call = ast.call("same", vec![three]);
        let r2 = ast.ret(call);
        let f = ast.function(Private, "f", vec![], vec![same, r2]);
        ast.push_definition(f);
        infer(&mut ast);
        globalize_inner_functions(&mut ast).unwrap();

        assert_eq!(ast.func(same).unwrap().args.len(), 1);
        let NodeKind::Call { args, .. } = ast.kind(call) else {
            panic!("call rewritten");
        };
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn anonymous_foreach_bodies_keep_captures_on_the_foreach() {
        let mut ast = Ast::new();
        let step = ast.arg("step", Type::Uint);
        let items: Vec<_> = (1..=3).map(|n| ast.uint(n)).collect();
        let list = ast.list(items);
        let n = ast.arg("n", Type::Unknown);
        let (nid, sid) = (ast.id("n"), ast.id("step"));
        let sum = ast.chain(ChainOp::Add, nid, sid);
        let r = ast.ret(sum);
        let body = ast.anon_func(vec![n], vec![r]);
        let each = ast.foreach(list, body);
        let r2 = ast.ret(each);
        let f = ast.function(Private, "shift", vec![step], vec![r2]);
        ast.push_definition(f);
        infer(&mut ast);
        globalize_inner_functions(&mut ast).unwrap();

        assert_eq!(root_names(&ast), vec!["inner-shift-anon", "shift"]);
        let NodeKind::Foreach { func, captured, .. } = ast.kind(each) else {
            panic!("foreach kept");
        };
        assert_eq!(ast.decl_name(*func), Some("inner-shift-anon"));
        let values: Vec<_> = captured.iter().filter_map(|&c| ast.decl_name(c)).collect();
        assert_eq!(values, vec!["step"]);
    }
}
