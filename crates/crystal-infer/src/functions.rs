//! Function graph: call gathering, recursion rejection and the order in
//! which top-level functions are inferred.
//!
//! Every function (nested ones included) is given the name it will have
//! once lifted to the top level, and marked when it refers to variables
//! of an enclosing function.

use std::collections::{BTreeMap, BTreeSet};

use crystal_ast::{Ast, NodeId, NodeKind};
use crystal_diag::{Category, Diagnostic};
use indexmap::IndexMap;
use tracing::debug;

use crate::builtins;
use crate::scope::{FindOpts, ScopeTable, generate_fn_name, push_scope};

/// A top-level function in inference order.
#[derive(Debug, Clone)]
pub struct DepEntry {
    pub name: String,
    pub node: NodeId,
    /// Scope chain identifiers in the function resolve against.
    pub scopes: Vec<NodeId>,
    /// Number of distinct functions reachable from this one.
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
struct GlobalFn {
    node: Option<NodeId>,
    calls: Vec<String>,
    exists_globally: bool,
    scopes: Vec<NodeId>,
}

struct Validator<'a> {
    ast: &'a mut Ast,
    table: ScopeTable,
    globals: IndexMap<String, GlobalFn>,
    /// Globalized names given to anonymous functions.
    anon_names: BTreeSet<String>,
    /// Per scope: nested function name to globalized name.
    inner: BTreeMap<NodeId, BTreeMap<String, String>>,
}

/// Check the function graph and return top-level functions ordered so
/// that callees come before their callers.
pub fn validate_functions(ast: &mut Ast) -> Result<Vec<DepEntry>, Diagnostic> {
    let mut globals: IndexMap<String, GlobalFn> = IndexMap::new();
    for &def in ast.definitions() {
        let Some(func) = ast.func(def) else { continue };
        let name = func.display_name().to_string();
        if globals.contains_key(&name) {
            return Err(Diagnostic::error(
                Category::AlreadyDeclared,
                format!("duplicate function name '{name}'"),
            )
            .at_line(ast.line(def)));
        }
        globals.insert(name, GlobalFn::default());
    }

    let root = ast.root();
    let mut validator = Validator {
        ast,
        table: ScopeTable::new(),
        globals,
        anon_names: BTreeSet::new(),
        inner: BTreeMap::new(),
    };
    validator.validate(root, &[])?;
    validator.dep_order()
}

/// Nested functions and conditionals directly inside `body`, in source
/// order, without looking into them.
fn nested_items(ast: &Ast, body: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    ast.walk(body, &mut |n| match ast.kind(n) {
        NodeKind::Func(_) | NodeKind::If(_) => {
            out.push(n);
            false
        }
        _ => true,
    });
    out
}

/// Calls under `id`, not looking into nested functions or branch bodies.
/// Conditions of conditionals are searched.
fn direct_calls(ast: &Ast, id: NodeId, out: &mut Vec<NodeId>) {
    let mut conds = Vec::new();
    ast.walk(id, &mut |n| match ast.kind(n) {
        NodeKind::Func(_) => false,
        NodeKind::If(stmt) => {
            conds.push(stmt.cond);
            conds.extend(stmt.elsif.iter().map(|e| e.cond));
            false
        }
        NodeKind::Call { .. } => {
            out.push(n);
            true
        }
        _ => true,
    });
    for cond in conds {
        if matches!(ast.kind(cond), NodeKind::Call { .. }) {
            out.push(cond);
        }
        direct_calls(ast, cond, out);
    }
}

fn scope_body(ast: &Ast, scope: NodeId) -> NodeId {
    match ast.func(scope) {
        Some(def) => def.body,
        None => scope,
    }
}

impl Validator<'_> {
    fn validate(&mut self, scope: NodeId, scopes: &[NodeId]) -> Result<Vec<String>, Diagnostic> {
        let mut calls: Vec<String> = Vec::new();
        if self.ast.func(scope).is_some() {
            self.ensure_unique_arg_names(scope)?;
        }
        let newscopes = push_scope(scopes, scope);
        let body = scope_body(self.ast, scope);

        for item in nested_items(self.ast, body) {
            match self.ast.kind(item) {
                NodeKind::Func(def) => {
                    let old_name = def.name.clone();
                    let anon = def.anon;
                    let globalized = generate_fn_name(self.ast, old_name.as_deref(), &newscopes, |n| {
                        self.globals.contains_key(n) || self.anon_names.contains(n)
                    })?;
                    let closure = self.uses_closure(&[newscopes[0], item])?;
                    if let Some(func) = self.ast.func_mut(item) {
                        func.globalized_name = Some(globalized.clone());
                        func.uses_closure = closure;
                    }
                    if anon {
                        self.anon_names.insert(globalized);
                        // An anonymous function runs on behalf of its parent.
                        calls.extend(self.validate(item, &newscopes)?);
                    } else {
                        if let Some(old_name) = old_name {
                            self.inner.entry(scope).or_default().insert(old_name, globalized);
                        }
                        self.validate(item, &newscopes)?;
                    }
                }
                NodeKind::If(stmt) => {
                    let mut bodies = vec![stmt.body];
                    bodies.extend(stmt.elsif.iter().map(|e| e.body));
                    bodies.extend(stmt.else_body);
                    for branch in bodies {
                        calls.extend(self.validate(branch, &newscopes)?);
                    }
                }
                _ => {}
            }
        }

        let mut call_nodes = Vec::new();
        direct_calls(self.ast, body, &mut call_nodes);
        for call in call_nodes {
            let NodeKind::Call { callee, args } = self.ast.kind(call) else {
                continue;
            };
            let Some(name) = self.ast.ident(*callee).map(|i| i.name.clone()) else {
                continue;
            };
            if self.globals.contains_key(&name) {
                calls.push(name);
            } else if let Some(global) = self.find_inner_function(&newscopes, &name) {
                calls.push(global);
            } else if builtins::lookup(&name).is_some() {
                // Some builtins take functions as arguments.
                for &arg in args {
                    let Some(arg_name) = self.ast.ident(arg).map(|i| i.name.as_str()) else {
                        continue;
                    };
                    if self.globals.contains_key(arg_name) {
                        calls.push(arg_name.to_string());
                    } else if let Some(global) = self.find_inner_function(&newscopes, arg_name) {
                        calls.push(global);
                    }
                }
            } else {
                return Err(Diagnostic::error(
                    Category::Syntax,
                    format!("unknown function '{name}'"),
                )
                .at_line(self.ast.line(call)));
            }
        }

        let Some(func) = self.ast.func(scope) else {
            return Ok(calls);
        };
        if func.anon {
            return Ok(calls);
        }
        let name = func.display_name().to_string();
        let global_name = func.globalized_name.clone().unwrap_or_else(|| name.clone());
        let exists_globally = global_name == name;
        if exists_globally {
            if let Some(func) = self.ast.func_mut(scope) {
                func.globalized_name = None;
            }
        }
        self.globals.insert(
            global_name,
            GlobalFn {
                node: Some(scope),
                calls,
                exists_globally,
                scopes: newscopes,
            },
        );
        Ok(Vec::new())
    }

    fn ensure_unique_arg_names(&self, func: NodeId) -> Result<(), Diagnostic> {
        let Some(def) = self.ast.func(func) else {
            return Ok(());
        };
        let mut seen = BTreeSet::new();
        for &arg in &def.args {
            let name = self.ast.decl_name(arg).unwrap_or_default();
            if !seen.insert(name) {
                return Err(Diagnostic::error(
                    Category::Syntax,
                    format!("duplicate argument name '{name}'"),
                )
                .at_line(self.ast.line(arg)));
            }
        }
        Ok(())
    }

    fn find_inner_function(&self, scopes: &[NodeId], name: &str) -> Option<String> {
        scopes
            .iter()
            .skip(1)
            .rev()
            .find_map(|s| self.inner.get(s).and_then(|m| m.get(name)).cloned())
    }

    /// Whether the function at the end of `scopes` refers to a name that
    /// is neither its own nor global.
    fn uses_closure(&self, scopes: &[NodeId]) -> Result<bool, Diagnostic> {
        let Some(&func) = scopes.last() else {
            return Ok(false);
        };
        let body = scope_body(self.ast, func);
        self.refers_outside(body, scopes)
    }

    fn refers_outside(&self, id: NodeId, scopes: &[NodeId]) -> Result<bool, Diagnostic> {
        let mut ids = Vec::new();
        let mut nested = Vec::new();
        self.ast.walk(id, &mut |n| match self.ast.kind(n) {
            NodeKind::Func(_) => {
                nested.push((n, n));
                false
            }
            NodeKind::If(stmt) => {
                ids.push(stmt.cond);
                ids.extend(stmt.elsif.iter().map(|e| e.cond));
                nested.push((stmt.body, stmt.body));
                nested.extend(stmt.elsif.iter().map(|e| (e.body, e.body)));
                nested.extend(stmt.else_body.map(|b| (b, b)));
                false
            }
            NodeKind::Id(_) => {
                ids.push(n);
                true
            }
            _ => true,
        });

        for expr in ids {
            let mut names = Vec::new();
            self.ast.walk_from(expr, &mut |n| {
                if let Some(ident) = self.ast.ident(n) {
                    names.push(ident.name.clone());
                }
                true
            });
            for name in names {
                if self
                    .table
                    .find_id(self.ast, scopes, &name, FindOpts::syntactic())?
                    .is_none()
                {
                    return Ok(true);
                }
            }
        }
        for (scope, walk) in nested {
            let inner = push_scope(scopes, scope);
            let target = scope_body(self.ast, walk);
            if self.refers_outside(target, &inner)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn dep_order(self) -> Result<Vec<DepEntry>, Diagnostic> {
        fn gather(globals: &IndexMap<String, GlobalFn>, calls: &[String], seen: &mut BTreeSet<String>) {
            for name in calls {
                if seen.insert(name.clone()) {
                    if let Some(callee) = globals.get(name) {
                        gather(globals, &callee.calls, seen);
                    }
                }
            }
        }

        let mut order = Vec::new();
        for (name, info) in &self.globals {
            let mut seen = BTreeSet::new();
            gather(&self.globals, &info.calls, &mut seen);
            if seen.contains(name) {
                return Err(Diagnostic::error(
                    Category::Recursion,
                    format!("function {name} has recursion"),
                )
                .at_line(info.node.and_then(|n| self.ast.line(n))));
            }
            if info.exists_globally {
                let Some(node) = info.node else { continue };
                order.push(DepEntry {
                    name: name.clone(),
                    node,
                    scopes: info.scopes.clone(),
                    count: seen.len(),
                });
            }
        }
        order.sort_by_key(|e| e.count);
        debug!(
            order = ?order.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            "function inference order"
        );
        Ok(order)
    }
}
