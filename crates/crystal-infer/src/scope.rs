//! Lexical scopes and the declaration table.
//!
//! A scope is identified by the node that owns it: the root statement
//! sequence, a function definition (its body plus its arguments), or the
//! body of a conditional branch. A scope chain lists these from the root
//! inwards.
//!
//! Lookups scan the statements of each scope syntactically, so a name is
//! "visible" as soon as its declaring statement exists. The declared-only
//! mode additionally requires the inference pass to have reached the
//! declaration, which is what the table records.

use std::collections::BTreeMap;

use crystal_ast::{Ast, NodeId, NodeKind};
use crystal_diag::{Category, Diagnostic};

use crate::builtins::{self, Builtin};

/// What a name resolves to.
#[derive(Debug, Clone, Copy)]
pub enum Resolved {
    /// A declaring node: variable, persistent storage, trait, extern
    /// contract or function argument.
    Decl(NodeId),
    Func(NodeId),
    Builtin(&'static Builtin),
}

#[derive(Debug, Clone, Copy)]
pub struct Found {
    pub resolved: Resolved,
    /// The scope the name was found in; `None` for builtins.
    pub scope: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FindOpts {
    /// Only match names the current pass has declared.
    pub declared_only: bool,
    /// With `declared_only`, still match functions not declared yet.
    pub function_hoist: bool,
}

impl FindOpts {
    pub fn syntactic() -> Self {
        Self::default()
    }

    pub fn declared(function_hoist: bool) -> Self {
        Self {
            declared_only: true,
            function_hoist,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Declared {
    vars: BTreeMap<String, NodeId>,
    funcs: BTreeMap<String, NodeId>,
}

/// Per-compilation record of declared names, keyed by scope node.
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    declared: BTreeMap<NodeId, Declared>,
}

/// Statement sequence and argument list of a scope.
fn scope_parts(ast: &Ast, scope: NodeId) -> (&[NodeId], &[NodeId]) {
    match ast.kind(scope) {
        NodeKind::Func(def) => (ast.stmts(def.body), &def.args),
        _ => (ast.stmts(scope), &[]),
    }
}

/// Name a scope contributes to generated names, if any.
fn scope_name(ast: &Ast, scope: NodeId) -> Option<&str> {
    ast.func(scope).and_then(|def| def.name.as_deref())
}

pub fn push_scope(scopes: &[NodeId], scope: NodeId) -> Vec<NodeId> {
    let mut out = scopes.to_vec();
    out.push(scope);
    out
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_declared_var(&self, scope: NodeId, name: &str) -> bool {
        self.declared
            .get(&scope)
            .is_some_and(|d| d.vars.contains_key(name))
    }

    fn is_declared_func(&self, scope: NodeId, name: &str) -> bool {
        self.declared
            .get(&scope)
            .is_some_and(|d| d.funcs.contains_key(name))
    }

    /// Resolve `name` from the innermost scope outwards, then against the
    /// builtin operations.
    pub fn find_id(
        &self,
        ast: &Ast,
        scopes: &[NodeId],
        name: &str,
        opts: FindOpts,
    ) -> Result<Option<Found>, Diagnostic> {
        for &scope in scopes.iter().rev() {
            let (stmts, args) = scope_parts(ast, scope);
            for &stmt in stmts {
                let found = match ast.kind(stmt) {
                    NodeKind::VarDecl(d) if d.id == name => {
                        self.var_visible(scope, name, opts).then_some(Resolved::Decl(stmt))
                    }
                    NodeKind::Persist(p) if p.id == name => {
                        self.var_visible(scope, name, opts).then_some(Resolved::Decl(stmt))
                    }
                    NodeKind::TraitDef(t) if t.id == name => {
                        self.var_visible(scope, name, opts).then_some(Resolved::Decl(stmt))
                    }
                    NodeKind::DeclareExtern(e) if e.id.as_deref() == Some(name) => {
                        self.var_visible(scope, name, opts).then_some(Resolved::Decl(stmt))
                    }
                    NodeKind::Func(def) if def.name.as_deref() == Some(name) => {
                        let visible = !opts.declared_only
                            || opts.function_hoist
                            || self.is_declared_func(scope, name);
                        visible.then_some(Resolved::Func(stmt))
                    }
                    _ => None,
                };
                if let Some(resolved) = found {
                    return Ok(Some(Found {
                        resolved,
                        scope: Some(scope),
                    }));
                }
            }
            for &arg in args {
                if matches!(ast.kind(arg), NodeKind::Arg(a) if a.name == name) {
                    return Ok(Some(Found {
                        resolved: Resolved::Decl(arg),
                        scope: Some(scope),
                    }));
                }
            }
        }

        if let Some(builtin) = builtins::lookup(name) {
            return Ok(Some(Found {
                resolved: Resolved::Builtin(builtin),
                scope: None,
            }));
        }

        if opts.declared_only {
            return Err(Diagnostic::error(
                Category::UndeclaredIdentifier,
                format!("undeclared identifier '{name}'"),
            ));
        }
        Ok(None)
    }

    fn var_visible(&self, scope: NodeId, name: &str, opts: FindOpts) -> bool {
        !opts.declared_only || self.is_declared_var(scope, name)
    }

    /// Fail when `name` is already declared anywhere in the chain or names
    /// a builtin operation.
    pub fn ensure_not_declared(
        &self,
        ast: &Ast,
        scopes: &[NodeId],
        name: &str,
    ) -> Result<(), Diagnostic> {
        let found = match self.find_id(ast, scopes, name, FindOpts::declared(false)) {
            Ok(found) => found,
            Err(e) if e.category == Category::UndeclaredIdentifier => return Ok(()),
            Err(e) => return Err(e),
        };
        match found.map(|f| f.resolved) {
            None => Ok(()),
            Some(Resolved::Builtin(_)) => Err(Diagnostic::error(
                Category::AlreadyDeclared,
                format!("'{name}' conflicts with system function of the same name"),
            )),
            Some(Resolved::Decl(node) | Resolved::Func(node)) => {
                Err(previously_declared(ast, name, node))
            }
        }
    }

    /// Register the declaring statement `node` in `scope`. `scopes` is the
    /// chain the name must not collide with.
    pub fn declare(
        &mut self,
        ast: &Ast,
        scope: NodeId,
        node: NodeId,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        let line = ast.line(node);
        let result = match ast.kind(node) {
            NodeKind::VarDecl(d) => {
                ensure_legal_identifier(&d.id)?;
                self.declare_var(ast, scope, &d.id, node, scopes)
            }
            NodeKind::Persist(p) => {
                ensure_legal_identifier(&p.id)?;
                self.declare_var(ast, scope, &p.id, node, scopes)
            }
            NodeKind::TraitDef(t) => self.declare_var(ast, scope, &t.id, node, scopes),
            NodeKind::DeclareExtern(e) => match &e.id {
                Some(id) => self.declare_var(ast, scope, id, node, scopes),
                None => Ok(()),
            },
            NodeKind::Func(def) => {
                // An argument may not reuse a name visible to the function.
                for &arg in &def.args {
                    if let Some(name) = ast.decl_name(arg) {
                        self.ensure_not_declared(ast, scopes, name)?;
                    }
                }
                let name = def.name.clone().unwrap_or_default();
                if let Some(global) = &def.globalized_name {
                    if let Some(&parent) = scopes.last() {
                        let claimed = self.declared.get(&parent).and_then(|d| {
                            d.vars.get(&name).or_else(|| d.funcs.get(&name)).copied()
                        });
                        if let Some(claimed) = claimed {
                            return Err(previously_declared(ast, &name, claimed).at_line(line));
                        }
                    }
                    if let Some(&root) = scopes.first() {
                        self.ensure_not_declared(ast, &[root], global)?;
                    }
                }
                self.ensure_not_declared(ast, scopes, &name)?;
                self.declared
                    .entry(scope)
                    .or_default()
                    .funcs
                    .insert(name, node);
                Ok(())
            }
            _ => Err(Diagnostic::internal("invalid declaration")),
        };
        result.map_err(|e| e.or_at_line(line))
    }

    fn declare_var(
        &mut self,
        ast: &Ast,
        scope: NodeId,
        name: &str,
        node: NodeId,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        self.ensure_not_declared(ast, scopes, name)?;
        self.declared
            .entry(scope)
            .or_default()
            .vars
            .insert(name.to_string(), node);
        Ok(())
    }
}

fn ensure_legal_identifier(name: &str) -> Result<(), Diagnostic> {
    for banned in ['-', '!', '?'] {
        if name.contains(banned) {
            return Err(Diagnostic::error(
                Category::Syntax,
                format!("identifier '{name}' contains illegal character '{banned}'"),
            ));
        }
    }
    Ok(())
}

fn previously_declared(ast: &Ast, name: &str, node: NodeId) -> Diagnostic {
    let line = ast
        .line(node)
        .map(|l| l.to_string())
        .unwrap_or_else(|| "?".to_string());
    Diagnostic::error(
        Category::AlreadyDeclared,
        format!(
            "'{name}' ({}) was previously declared on line {line}",
            ast.describe(node)
        ),
    )
}

/// Unique top-level name for a function nested in `scopes`.
///
/// A function declared directly at the root keeps its name. Nested ones
/// are prefixed with the names of the enclosing named functions, e.g.
/// `inner-outer-helper`, and numbered when the name is taken.
pub fn generate_fn_name(
    ast: &Ast,
    old_name: Option<&str>,
    scopes: &[NodeId],
    taken: impl Fn(&str) -> bool,
) -> Result<String, Diagnostic> {
    if scopes.len() == 1 {
        return old_name
            .map(str::to_string)
            .ok_or_else(|| Diagnostic::internal("top-level function has no name"));
    }
    let prefix: Vec<&str> = scopes.iter().filter_map(|&s| scope_name(ast, s)).collect();
    let base = format!("inner-{}-{}", prefix.join("-"), old_name.unwrap_or("anon"));
    let mut name = base.clone();
    let mut n = 2;
    while taken(&name) {
        name = format!("{base}-{n}");
        n += 1;
    }
    Ok(name)
}

/// Argument name for a captured variable: `cl` followed by one letter per
/// enclosing scope, then the variable name, e.g. `clsf-count`.
pub fn generate_id_name(
    ast: &Ast,
    old_name: &str,
    scopes: &[NodeId],
    existing_args: &[NodeId],
) -> String {
    let mut proposed = String::from("cl");
    for &scope in scopes {
        match scope_name(ast, scope).and_then(|n| n.chars().next()) {
            Some(c) => proposed.push(c),
            None => proposed.push('s'),
        }
    }
    proposed.push('-');
    proposed.push_str(old_name);

    let exists = |candidate: &str| {
        existing_args
            .iter()
            .any(|&a| ast.decl_name(a) == Some(candidate))
    };
    let mut cur = proposed.clone();
    let mut n = 0;
    while exists(&cur) {
        n += 1;
        cur = format!("{proposed}{n}");
    }
    cur
}
