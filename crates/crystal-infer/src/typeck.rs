//! Type inference engine.
//!
//! Top-level definitions are filled in dependency order, so a callee's
//! return type is known before its callers need it. Each function body
//! gets a first pass that tolerates undetermined types; if anything was
//! left open (a forward reference to a nested function, say), a second
//! pass over the same body must finish the job or fail.
//!
//! Filling mutates the tree: literals are narrowed, optionals wrapped or
//! unwrapped, constant conditions folded and property accesses rewritten
//! into builtin calls. Expressions live in `exprs`, property access in
//! `brackets`, calls in `calls` and iteration in `foreach`.

use crystal_ast::{Ast, NodeId, NodeKind, PersistKind, Visibility};
use crystal_diag::{Category, Diagnostic, WarningSink};
use crystal_types::{TraitTarget, Type, equal};
use tracing::{debug, info};

use crate::coerce::{builtin_call, coerce_lit_map_values, coerce_literal, truthy};
use crate::functions::DepEntry;
use crate::scope::{ScopeTable, push_scope};
use crate::trace::{InferStep, InferTrace, PassOutcome};

/// Knobs for [`determine_types`].
#[derive(Debug, Clone, Copy)]
pub struct InferOptions {
    /// Fold constant conditions and literal arithmetic.
    pub optimize: bool,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self { optimize: true }
    }
}

/// Per-pass settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FillCtx {
    /// Record undetermined types instead of failing.
    pub allow_incomplete: bool,
    /// Second pass: names were declared by the first one.
    pub backfilling: bool,
    /// Functions are visible before their declaration is reached.
    pub function_hoist: bool,
}

impl FillCtx {
    fn strict() -> Self {
        Self {
            allow_incomplete: false,
            backfilling: false,
            function_hoist: true,
        }
    }

    fn first_pass() -> Self {
        Self {
            allow_incomplete: true,
            ..Self::strict()
        }
    }

    fn backfill() -> Self {
        Self {
            backfilling: true,
            ..Self::strict()
        }
    }

    /// Top-level values are evaluated in source order at deploy time, so
    /// they may only see what precedes them.
    fn in_order() -> Self {
        Self {
            function_hoist: false,
            ..Self::strict()
        }
    }
}

/// A unit of top-level work.
#[derive(Debug)]
struct Work {
    name: String,
    node: NodeId,
    scopes: Vec<NodeId>,
}

pub struct Infer<'a> {
    pub(crate) ast: &'a mut Ast,
    pub(crate) scopes: ScopeTable,
    pub(crate) optimize: bool,
    warnings: &'a mut dyn WarningSink,
    pub(crate) ctx: FillCtx,
    backfill_needed: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Fill in the type of every node reachable from the top-level
/// definitions.
///
/// `order` is the function order computed by
/// [`validate_functions`](crate::validate_functions). Other definitions
/// keep their place relative to the functions that preceded them in
/// source order. When `trace` is given, one step per definition is
/// recorded, the failing one included.
pub fn determine_types(
    ast: &mut Ast,
    order: Vec<DepEntry>,
    options: &InferOptions,
    warnings: &mut dyn WarningSink,
    mut trace: Option<&mut InferTrace>,
) -> Result<(), Diagnostic> {
    let work = processing_order(ast, order);
    info!(definitions = work.len(), "determining types");

    let mut infer = Infer {
        ast,
        scopes: ScopeTable::new(),
        optimize: options.optimize,
        warnings,
        ctx: FillCtx::strict(),
        backfill_needed: false,
    };
    for item in &work {
        let result = infer.fill_global(item.node, &item.scopes);
        if let Some(trace) = trace.as_deref_mut() {
            trace.push(infer.step(item, &result));
        }
        if let Err(e) = result {
            let line = infer.ast.line(item.node);
            let e = e.or_at_line(line);
            return Err(match infer.import_path(item.node) {
                Some(path) => e.in_file(path),
                None => e,
            });
        }
    }
    Ok(())
}

/// Interleave non-function definitions with the ordered functions.
///
/// ```text
/// source:     a()  const x  b()
/// functions:  b(), a()
/// processed:  b(), a(), const x
/// ```
fn processing_order(ast: &Ast, order: Vec<DepEntry>) -> Vec<Work> {
    let root = ast.root();
    // Slot `n` holds the definitions that follow the first `n` functions.
    let mut after: Vec<Vec<Work>> = (0..=order.len()).map(|_| Vec::new()).collect();
    let mut seen = 0;
    for &def in ast.definitions() {
        if ast.func(def).is_some() {
            if let Some(pos) = order[seen..].iter().position(|e| e.node == def) {
                seen += pos + 1;
            }
        } else {
            after[seen].push(Work {
                name: ast.decl_name(def).unwrap_or(ast.describe(def)).to_string(),
                node: def,
                scopes: vec![root],
            });
        }
    }

    let mut slots = after.into_iter();
    let mut out = slots.next().unwrap_or_default();
    for (entry, later) in order.into_iter().zip(slots) {
        out.push(Work {
            name: entry.name,
            node: entry.node,
            scopes: entry.scopes,
        });
        out.extend(later);
    }
    out
}

impl<'a> Infer<'a> {
    fn step(&self, item: &Work, result: &Result<PassOutcome, Diagnostic>) -> InferStep {
        let ty = self.ast.ty(item.node);
        InferStep {
            name: item.name.clone(),
            kind: self.ast.describe(item.node),
            outcome: match result {
                Ok(outcome) => *outcome,
                Err(_) => PassOutcome::Failed,
            },
            ty: (!ty.is_undetermined()).then(|| ty.to_string()),
            line: self.ast.line(item.node),
        }
    }

    fn import_path(&self, node: NodeId) -> Option<String> {
        match self.ast.kind(node) {
            NodeKind::Func(def) => def.import_path.clone(),
            NodeKind::DeclareExtern(decl) => decl.import_path.clone(),
            _ => None,
        }
    }

    /// Run `f` under `ctx`. Returns whether it left types undetermined.
    fn with_ctx<T>(
        &mut self,
        ctx: FillCtx,
        f: impl FnOnce(&mut Self) -> Result<T, Diagnostic>,
    ) -> Result<(T, bool), Diagnostic> {
        let saved_ctx = std::mem::replace(&mut self.ctx, ctx);
        let saved_flag = std::mem::take(&mut self.backfill_needed);
        let out = f(self);
        let needed = std::mem::replace(&mut self.backfill_needed, saved_flag);
        self.ctx = saved_ctx;
        out.map(|v| (v, needed))
    }

    pub(crate) fn warn(&mut self, node: NodeId, message: impl Into<String>) {
        let line = self.ast.line(node);
        self.warnings.warn(Diagnostic::warning(message).at_line(line));
    }

    // -----------------------------------------------------------------------
    // Undetermined types
    // -----------------------------------------------------------------------

    /// Whether every node has a usable type. An undetermined one is
    /// recorded for backfill, and is an error unless incomplete types are
    /// allowed. A function reference counts as undetermined until the
    /// function's return type is known.
    pub(crate) fn check(&mut self, nodes: &[NodeId], msg: Option<&str>) -> Result<bool, Diagnostic> {
        for &node in nodes {
            let ty = self.ast.ty(node);
            let open = ty.is_undetermined()
                || matches!(ty, Type::Func(f) if self.ast.ty(f.def).is_undetermined());
            if open {
                let e = Diagnostic::error(
                    Category::UndeterminedType,
                    msg.unwrap_or("undetermined type"),
                )
                .at_line(self.ast.line(node));
                self.undetermined(e)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Absorb an `UndeterminedType` error when the pass allows it. Any
    /// other error passes through.
    pub(crate) fn undetermined(&mut self, e: Diagnostic) -> Result<(), Diagnostic> {
        if e.category != Category::UndeterminedType {
            return Err(e);
        }
        self.backfill_needed = true;
        if self.ctx.allow_incomplete {
            Ok(())
        } else {
            Err(e)
        }
    }

    // -----------------------------------------------------------------------
    // Type assertions
    // -----------------------------------------------------------------------

    pub(crate) fn ensure_equal(&self, a: &Type, b: &Type, color: Option<&str>) -> Result<(), Diagnostic> {
        if equal(a, b) {
            return Ok(());
        }
        Err(Diagnostic::error(
            Category::TypeMismatch,
            format!("{}the types '{a}' and '{b}' are incompatible", prefix(color)),
        ))
    }

    pub(crate) fn ensure_type(&self, ty: &Type, expected: &Type, color: Option<&str>) -> Result<(), Diagnostic> {
        if equal(ty, expected) {
            return Ok(());
        }
        Err(Diagnostic::error(
            Category::TypeMismatch,
            format!(
                "{}unsupported type. expected type '{expected}' but got '{ty}'",
                prefix(color)
            ),
        ))
    }

    pub(crate) fn ensure_one_of(&self, ty: &Type, valid: &[Type], color: Option<&str>) -> Result<(), Diagnostic> {
        if let [only] = valid {
            return self.ensure_type(ty, only, color);
        }
        if valid.iter().any(|v| equal(ty, v)) {
            return Ok(());
        }
        Err(Diagnostic::error(
            Category::TypeMismatch,
            format!(
                "{}unsupported type. expected one of '{}' but got '{ty}'",
                prefix(color),
                crystal_types::pretty_types(valid, false)
            ),
        ))
    }

    // -----------------------------------------------------------------------
    // Top-level definitions
    // -----------------------------------------------------------------------

    fn fill_global(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<PassOutcome, Diagnostic> {
        match self.ast.kind(node) {
            NodeKind::Func(_) => return self.fill_function(node, scopes),
            NodeKind::VarDecl(_) => self.fill_const(node, scopes)?,
            NodeKind::Persist(_) => self.fill_persist(node, scopes)?,
            NodeKind::TraitDef(_) => self.fill_trait_def(node, scopes)?,
            NodeKind::ImplTrait { .. } => self.fill_impl_trait(node, scopes)?,
            NodeKind::DeclareExtern(_) => self.fill_declare_extern(node, scopes)?,
            _ => {
                self.with_ctx(FillCtx::in_order(), |s| s.fill_stmt(node, scopes))?;
            }
        }
        Ok(PassOutcome::Complete)
    }

    fn fill_function(&mut self, func: NodeId, scopes: &[NodeId]) -> Result<PassOutcome, Diagnostic> {
        let root = self.ast.root();
        let (name, vis, body) = match self.ast.func(func) {
            Some(def) => (def.display_name().to_string(), def.vis, def.body),
            None => return Err(Diagnostic::internal("expected a function definition")),
        };

        self.with_ctx(FillCtx::strict(), |s| s.fill_args(func, &[root], false))?;
        let ((), needed) = self.with_ctx(FillCtx::first_pass(), |s| s.fill_body(body, scopes))?;
        let outcome = if needed {
            debug!(function = %name, "backfilling");
            self.with_ctx(FillCtx::backfill(), |s| s.fill_body(body, scopes))?;
            PassOutcome::Backfilled
        } else {
            PassOutcome::Complete
        };

        let ret = self.fn_return_type(func)?;
        debug!(function = %name, returns = %ret, "function typed");
        self.ast.set_ty(func, ret.clone());
        self.ast.add_comment(func, format!(";; returns {ret}"));

        if !ret.is_response() {
            match vis {
                Visibility::Public => {
                    return Err(Diagnostic::error(
                        Category::TypeMismatch,
                        format!("public function '{name}' must return a response type using ok() or err()"),
                    )
                    .at_line(self.ast.line(func)));
                }
                Visibility::ReadOnly => self.warn(
                    func,
                    format!("read-only function '{name}' does not return a response type using ok() or err()."),
                ),
                Visibility::Private => {}
            }
        }

        self.check_function_implements_trait(func)?;
        let outer = &scopes[..scopes.len().saturating_sub(1)];
        self.scopes.declare(&*self.ast, root, func, outer)?;
        Ok(outcome)
    }

    fn fill_const(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let NodeKind::VarDecl(decl) = self.ast.kind(node).clone() else {
            return Ok(());
        };
        self.with_ctx(FillCtx::in_order(), |s| {
            s.fill_expr(decl.expr, scopes)?;
            s.check(&[decl.expr], Some(&format!("'{}' has undetermined type", decl.id)))
        })?;
        let ty = self.ast.ty(decl.expr).clone();
        if matches!(ty, Type::Typedef(_) | Type::Func(_) | Type::Builtin(_)) {
            return Err(Diagnostic::error(
                Category::Syntax,
                format!("not a valid assignment, type '{ty}'"),
            ));
        }
        self.ast.set_ty(node, ty);
        self.scopes.declare(&*self.ast, scopes[0], node, scopes)
    }

    fn fill_persist(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let NodeKind::Persist(persist) = self.ast.kind(node).clone() else {
            return Ok(());
        };
        match persist.kind {
            PersistKind::DataMap | PersistKind::Nft => {}
            PersistKind::Ft { total_supply } => {
                if let Some(supply) = total_supply {
                    self.with_ctx(FillCtx::strict(), |s| s.fill_expr(supply, scopes))?;
                    coerce_literal(self.ast, supply, &Type::Uint);
                    self.ensure_equal(self.ast.ty(supply), &Type::Uint, Some("total supply"))?;
                }
            }
            PersistKind::DataVar { initial } => {
                self.with_ctx(FillCtx::strict(), |s| s.fill_expr(initial, scopes))?;
                let declared = self.ast.ty(node).clone();
                coerce_literal(self.ast, initial, &declared);
                coerce_lit_map_values(self.ast, &declared, initial);
                self.ensure_equal(&declared, self.ast.ty(initial), Some("initial value"))?;
            }
        }
        self.scopes.declare(&*self.ast, scopes[0], node, scopes)
    }

    fn fill_trait_def(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        self.scopes.declare(&*self.ast, scopes[0], node, scopes)?;
        let members = match self.ast.kind(node) {
            NodeKind::TraitDef(t) => t.members.clone(),
            _ => Vec::new(),
        };
        for member in members {
            self.ensure_equal(
                self.ast.ty(member),
                &Type::any_response(),
                Some("trait functions must return a response type in the form 'response<oktype,errtype>'"),
            )
            .map_err(|e| e.at_line(self.ast.line(member)))?;
            self.with_ctx(FillCtx::strict(), |s| s.fill_args(member, scopes, true))?;
        }
        Ok(())
    }

    fn fill_impl_trait(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let NodeKind::ImplTrait { expr } = *self.ast.kind(node) else {
            return Ok(());
        };
        self.with_ctx(FillCtx::strict(), |s| s.fill_expr(expr, scopes))?;
        match self.ast.ty(expr) {
            Type::TraitDef(_) => Ok(()),
            Type::Principal => Err(Diagnostic::error(
                Category::NotSupported,
                "specifying a contract trait name using contract id syntax is not supported. Instead, specify the trait to implement by importing the contract that defines the trait using 'import', then reference the import and trait name",
            )),
            other => Err(Diagnostic::error(
                Category::TypeMismatch,
                format!("unsupported type. expected type 'trait_def' but got '{other}'"),
            )),
        }
    }

    fn fill_declare_extern(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let NodeKind::DeclareExtern(decl) = self.ast.kind(node).clone() else {
            return Ok(());
        };
        let Some(contract_id) = decl.contract_id else {
            return Err(Diagnostic::error(
                Category::Syntax,
                "a contract must be associated with the extern declaration",
            ));
        };
        self.with_ctx(FillCtx::strict(), |s| {
            s.fill_expr(contract_id, scopes)?;
            for &def in &decl.defs {
                match s.ast.kind_mut(def) {
                    NodeKind::ExternFunc(f) => {
                        f.contract_id = Some(contract_id);
                        s.fill_args(def, scopes, true)?;
                    }
                    NodeKind::TraitDef(t) => {
                        t.contract_id = Some(contract_id);
                        t.external = true;
                        for member in t.members.clone() {
                            if let NodeKind::ExternFunc(f) = s.ast.kind_mut(member) {
                                f.contract_id = Some(contract_id);
                            }
                            s.fill_args(member, scopes, true)?;
                        }
                    }
                    NodeKind::ExternTraitImpl { impl_contract_id } => {
                        let cid = *impl_contract_id;
                        s.fill_expr(cid, scopes)?;
                    }
                    _ => {}
                }
            }
            Ok(())
        })?;
        // Without an alias nothing can refer to the declaration.
        if decl.id.is_some() {
            self.scopes.declare(&*self.ast, scopes[0], node, scopes)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Argument lists
    // -----------------------------------------------------------------------

    /// Resolve trait-typed arguments to the trait they name.
    pub(crate) fn fill_args(&mut self, owner: NodeId, scopes: &[NodeId], external: bool) -> Result<(), Diagnostic> {
        let args = match self.ast.kind(owner) {
            NodeKind::Func(def) => def.args.clone(),
            NodeKind::ExternFunc(f) => f.args.clone(),
            _ => return Ok(()),
        };
        for (idx, arg) in args.into_iter().enumerate() {
            let Type::Trait(TraitTarget::Pending(expr)) = *self.ast.ty(arg) else {
                continue;
            };
            self.fill_expr(expr, scopes)?;
            if !self.check(&[expr], None)? {
                continue;
            }
            let import_hint = || {
                Diagnostic::error(
                    Category::Argument,
                    format!(
                        "specify the trait to accept as argument {} by importing the contract that defines the trait using 'import', then reference the trait name from the import",
                        idx + 1
                    ),
                )
                .at_line(self.ast.line(arg))
            };
            let target = match self.ast.ty(expr).clone() {
                Type::Principal if !external => return Err(import_hint()),
                Type::Principal => match self.ast.lit_text(expr) {
                    Some(cid) => TraitTarget::Principal(cid.to_string()),
                    None => return Err(import_hint()),
                },
                Type::TraitDef(def) => {
                    let NodeKind::TraitDef(decl) = self.ast.kind(def) else {
                        return Err(Diagnostic::internal("trait type without a trait declaration"));
                    };
                    let Some(cid) = decl.contract_id.and_then(|c| self.ast.lit_text(c)) else {
                        return Err(import_hint());
                    };
                    TraitTarget::Def {
                        def,
                        contract_id: format!("{cid}.{}", decl.id),
                    }
                }
                other => {
                    self.ensure_one_of(
                        &other,
                        &[Type::Principal, Type::TraitDef(expr)],
                        Some(&format!("argument '{}'", idx + 1)),
                    )?;
                    continue;
                }
            };
            self.ast.set_ty(arg, Type::Trait(target));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bodies and statements
    // -----------------------------------------------------------------------

    pub(crate) fn fill_body(&mut self, body: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let stmts = self.ast.stmts(body).to_vec();
        let scope = *scopes.last().ok_or_else(|| Diagnostic::internal("empty scope chain"))?;
        if stmts.is_empty() {
            return Err(Diagnostic::error(Category::Syntax, "empty body").at_line(self.ast.line(scope)));
        }
        for stmt in stmts {
            if matches!(self.ast.kind(stmt), NodeKind::VarDecl(_)) {
                self.fill_vardecl(stmt, scope, scopes)?;
            } else {
                self.fill_stmt(stmt, scopes)?;
            }
        }
        Ok(())
    }

    fn fill_vardecl(&mut self, stmt: NodeId, scope: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let NodeKind::VarDecl(decl) = self.ast.kind(stmt).clone() else {
            return Ok(());
        };
        let line = self.ast.line(stmt);
        self.fill_expr(decl.expr, scopes)?;
        let msg = format!("'{}' has undetermined type", decl.id);
        if self.check(&[decl.expr], Some(&msg))? {
            let ty = self.ast.ty(decl.expr).clone();
            match ty {
                Type::Func(_) | Type::Builtin(_) => {
                    return Err(Diagnostic::error(
                        Category::NotSupported,
                        "variables may not hold function references in Clarity",
                    )
                    .or_at_line(line));
                }
                Type::Typedef(_) => {
                    return Err(
                        Diagnostic::error(Category::Syntax, format!("not a valid assignment, type '{ty}'"))
                            .or_at_line(line),
                    );
                }
                _ => self.ast.set_ty(stmt, ty),
            }
        }
        if !self.ctx.backfilling {
            self.scopes.declare(&*self.ast, scope, stmt, scopes)?;
        }
        Ok(())
    }

    pub(crate) fn fill_stmt(&mut self, stmt: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let line = self.ast.line(stmt);
        self.fill_stmt_kind(stmt, scopes).map_err(|e| e.or_at_line(line))
    }

    fn fill_stmt_kind(&mut self, stmt: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        match self.ast.kind(stmt).clone() {
            NodeKind::Nop => Ok(()),
            NodeKind::Return { expr } => {
                if !self.ast.ty(stmt).is_undetermined() {
                    return Ok(());
                }
                self.fill_expr(expr, scopes)?;
                if self.check(&[expr], None)? {
                    let ty = self.ast.ty(expr).clone();
                    self.ast.set_ty(stmt, ty);
                }
                Ok(())
            }
            NodeKind::If(_) => self.fill_if(stmt, scopes),
            NodeKind::Scope { body, .. } => {
                self.fill_body(body, &push_scope(scopes, body))?;
                let returns = self.body_return_type(body, None)?;
                if let NodeKind::Scope { body_return, .. } = self.ast.kind_mut(stmt) {
                    *body_return = returns;
                }
                Ok(())
            }
            NodeKind::Func(_) => self.fill_nested_function(stmt, scopes),
            NodeKind::VarDecl(_) => {
                let scope = *scopes.last().ok_or_else(|| Diagnostic::internal("empty scope chain"))?;
                self.fill_vardecl(stmt, scope, scopes)
            }
            _ => self.fill_expr_stmt(stmt, scopes),
        }
    }

    fn fill_nested_function(&mut self, func: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        if !self.ast.ty(func).is_undetermined() {
            return Ok(());
        }
        let body = self.ast.func(func).map(|f| f.body).unwrap_or(func);
        self.fill_args(func, scopes, false)?;
        self.fill_body(body, &push_scope(scopes, func))?;
        self.settle_return_type(func)?;
        if !self.ctx.backfilling {
            let scope = *scopes.last().ok_or_else(|| Diagnostic::internal("empty scope chain"))?;
            self.scopes.declare(&*self.ast, scope, func, scopes)?;
        }
        Ok(())
    }

    /// Set the return type of a nested or anonymous function once all its
    /// paths have one.
    pub(crate) fn settle_return_type(&mut self, func: NodeId) -> Result<(), Diagnostic> {
        match self.fn_return_type(func) {
            Ok(ret) if !ret.is_undetermined() => {
                self.ast.set_ty(func, ret);
                Ok(())
            }
            Ok(_) => self.undetermined(Diagnostic::error(
                Category::UndeterminedType,
                "undetermined return type",
            )),
            Err(e) => self.undetermined(e),
        }
    }

    /// A statement that is just an expression. Its value is discarded, so
    /// a response nobody looks at is turned into `is-ok(..)`.
    fn fill_expr_stmt(&mut self, stmt: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        self.fill_expr(stmt, scopes)?;
        if self.check(&[stmt], None)? && self.ast.ty(stmt).is_response() {
            self.warn(stmt, "unchecked response");
            let inner = self.ast.detach(stmt);
            let call = builtin_call(self.ast, "is-ok", vec![inner]);
            self.ast.reset(stmt, call, Type::Unknown);
            self.fill_expr(stmt, scopes)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Conditionals
    // -----------------------------------------------------------------------

    fn fill_condition(&mut self, cond: NodeId, scopes: &[NodeId], color: &str) -> Result<(), Diagnostic> {
        self.fill_expr(cond, scopes)?;
        if self.check(&[cond], None)? {
            truthy(self.ast, cond);
            self.ensure_type(self.ast.ty(cond), &Type::Bool, Some(color))
                .map_err(|e| e.or_at_line(self.ast.line(cond)))?;
        }
        Ok(())
    }

    fn if_parts(&self, stmt: NodeId) -> Option<crystal_ast::IfStmt> {
        match self.ast.kind(stmt) {
            NodeKind::If(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn fill_if(&mut self, stmt: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let Some(parts) = self.if_parts(stmt) else {
            return Ok(());
        };
        self.fill_condition(parts.cond, scopes, "if expression")?;

        if self.optimize && self.fold_if(stmt, scopes)? {
            // Folded into a scope or removed.
            return self.fill_stmt_kind(stmt, scopes);
        }

        let Some(parts) = self.if_parts(stmt) else {
            return Ok(());
        };
        self.fill_body(parts.body, &push_scope(scopes, parts.body))?;
        let body_return = self.body_return_type(parts.body, None)?;

        let mut elsifs = Vec::with_capacity(parts.elsif.len());
        for mut elsif in parts.elsif {
            self.fill_expr(elsif.cond, scopes)?;
            if self.optimize && self.ast.lit_bool(elsif.cond) == Some(false) {
                continue;
            }
            self.fill_condition(elsif.cond, scopes, "else if expression")?;
            self.fill_body(elsif.body, &push_scope(scopes, elsif.body))?;
            elsif.body_return = self.body_return_type(elsif.body, None)?;
            elsifs.push(elsif);
        }

        let else_return = match parts.else_body {
            Some(else_body) => {
                self.fill_body(else_body, &push_scope(scopes, else_body))?;
                self.body_return_type(else_body, None)?
            }
            None => None,
        };

        if let NodeKind::If(s) = self.ast.kind_mut(stmt) {
            s.body_return = body_return;
            s.elsif = elsifs;
            s.else_return = else_return;
        }
        Ok(())
    }

    /// Fold literal conditions. A false condition promotes the next
    /// `elsif`; when none is left the `else` body, if any, becomes an
    /// unconditional scope. A true condition keeps only its own body.
    /// Returns whether the statement stopped being an `if`.
    fn fold_if(&mut self, stmt: NodeId, scopes: &[NodeId]) -> Result<bool, Diagnostic> {
        loop {
            let Some(parts) = self.if_parts(stmt) else {
                return Ok(true);
            };
            match self.ast.lit_bool(parts.cond) {
                Some(true) => {
                    self.ast.reset(
                        stmt,
                        NodeKind::Scope {
                            body: parts.body,
                            body_return: None,
                        },
                        Type::Unknown,
                    );
                    return Ok(true);
                }
                Some(false) if !parts.elsif.is_empty() => {
                    let promoted = if let NodeKind::If(s) = self.ast.kind_mut(stmt) {
                        let next = s.elsif.remove(0);
                        s.cond = next.cond;
                        s.body = next.body;
                        next.cond
                    } else {
                        return Ok(true);
                    };
                    self.fill_condition(promoted, scopes, "if expression")?;
                }
                Some(false) => {
                    match parts.else_body {
                        Some(body) => self.ast.reset(
                            stmt,
                            NodeKind::Scope {
                                body,
                                body_return: None,
                            },
                            Type::Unknown,
                        ),
                        None => self.ast.make_nop(stmt),
                    }
                    return Ok(true);
                }
                None => return Ok(false),
            }
        }
    }
}

fn prefix(color: Option<&str>) -> String {
    color.map(|c| format!("{c}. ")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_ast::Visibility::*;

    use crate::functions::validate_functions;

    fn infer(ast: &mut Ast) -> Result<Vec<Diagnostic>, Diagnostic> {
        let order = validate_functions(ast)?;
        let mut warnings = Vec::new();
        determine_types(ast, order, &InferOptions::default(), &mut warnings, None)?;
        Ok(warnings)
    }

    #[test]
    fn constants_fold_literal_arithmetic() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let two = ast.int(2);
        let sum = ast.chain(crystal_ast::ChainOp::Add, one, two);
        let a = ast.const_decl("a", sum);
        ast.push_definition(a);
        infer(&mut ast).unwrap();
        assert_eq!(ast.ty(a), &Type::Int);
        assert_eq!(ast.lit(sum), Some(&crystal_ast::Lit::Int(3)));
    }

    #[test]
    fn public_functions_must_return_a_response() {
        let mut ast = Ast::new();
        let one = ast.uint(1);
        let ret = ast.ret(one);
        let f = ast.function(Public, "get", vec![], vec![ret]);
        ast.at(f, 4);
        ast.push_definition(f);
        let err = infer(&mut ast).unwrap_err();
        assert_eq!(err.category, Category::TypeMismatch);
        assert_eq!(
            err.message,
            "public function 'get' must return a response type using ok() or err()"
        );
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn read_only_without_response_warns() {
        let mut ast = Ast::new();
        let one = ast.uint(1);
        let ret = ast.ret(one);
        let f = ast.function(ReadOnly, "peek", vec![], vec![ret]);
        ast.push_definition(f);
        let warnings = infer(&mut ast).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.starts_with("read-only function 'peek'"));
        assert_eq!(ast.ty(f), &Type::Uint);
        assert_eq!(ast[f].comments, vec![";; returns uint".to_string()]);
    }

    #[test]
    fn forward_references_are_backfilled() {
        // function outer() { const v = inner(); function inner() { return 5; } return v; }
        let mut ast = Ast::new();
        let call = ast.call("inner", vec![]);
        let v = ast.const_decl("v", call);
        let five = ast.int(5);
        let inner_ret = ast.ret(five);
        let inner = ast.function(Private, "inner", vec![], vec![inner_ret]);
        let vid = ast.id("v");
        let ret = ast.ret(vid);
        let outer = ast.function(Private, "outer", vec![], vec![v, inner, ret]);
        ast.push_definition(outer);

        let order = validate_functions(&mut ast).unwrap();
        let mut warnings = Vec::new();
        let mut trace = InferTrace::default();
        determine_types(
            &mut ast,
            order,
            &InferOptions::default(),
            &mut warnings,
            Some(&mut trace),
        )
        .unwrap();
        assert_eq!(ast.ty(outer), &Type::Int);
        assert_eq!(trace.backfilled().collect::<Vec<_>>(), vec!["outer"]);
    }

    #[test]
    fn unchecked_responses_become_is_ok() {
        let mut ast = Ast::new();
        let one = ast.uint(1);
        let ok = ast.call("ok", vec![one]);
        let t = ast.bool_lit(true);
        let ok_t = ast.call("ok", vec![t]);
        let ret = ast.ret(ok_t);
        let f = ast.function(Public, "run", vec![], vec![ok, ret]);
        ast.push_definition(f);
        let warnings = infer(&mut ast).unwrap();
        assert!(warnings.iter().any(|w| w.message == "unchecked response"));
        assert_eq!(ast.ty(ok), &Type::Bool);
        let NodeKind::Call { callee, .. } = ast.kind(ok) else {
            panic!("expected a call");
        };
        assert_eq!(ast.ident(*callee).unwrap().name, "is-ok");
    }

    #[test]
    fn false_conditions_promote_elsif() {
        let mut ast = Ast::new();
        let f = ast.bool_lit(false);
        let one = ast.int(1);
        let r1 = ast.ret(one);
        let stmt = ast.if_stmt(f, vec![r1]);
        let x = ast.arg("x", Type::Bool);
        let xid = ast.id("x");
        let two = ast.int(2);
        let r2 = ast.ret(two);
        ast.add_elsif(stmt, xid, vec![r2]);
        let three = ast.int(3);
        let r3 = ast.ret(three);
        let func = ast.function(Private, "pick", vec![x], vec![stmt, r3]);
        ast.push_definition(func);
        infer(&mut ast).unwrap();
        let NodeKind::If(s) = ast.kind(stmt) else {
            panic!("expected the if to survive");
        };
        assert!(s.elsif.is_empty());
        assert_eq!(ast.ident(s.cond).unwrap().name, "x");
        assert_eq!(s.body_return, Some(Type::Int));
    }

    #[test]
    fn false_condition_without_else_disappears() {
        let mut ast = Ast::new();
        let f = ast.bool_lit(false);
        let one = ast.int(1);
        let r1 = ast.ret(one);
        let stmt = ast.if_stmt(f, vec![r1]);
        let two = ast.int(2);
        let r2 = ast.ret(two);
        let func = ast.function(Private, "two", vec![], vec![stmt, r2]);
        ast.push_definition(func);
        infer(&mut ast).unwrap();
        assert!(matches!(ast.kind(stmt), NodeKind::Nop));
    }

    /// Run the conditional folding again on an already inferred tree.
    fn fold_again(ast: &mut Ast, stmt: NodeId) -> bool {
        let root = ast.root();
        let mut warnings = Vec::new();
        let mut infer = Infer {
            ast,
            scopes: ScopeTable::new(),
            optimize: true,
            warnings: &mut warnings,
            ctx: FillCtx::strict(),
            backfill_needed: false,
        };
        infer.fold_if(stmt, &[root]).unwrap()
    }

    #[test]
    fn folding_a_folded_if_changes_nothing() {
        let mut ast = Ast::new();
        let f = ast.bool_lit(false);
        let one = ast.int(1);
        let r1 = ast.ret(one);
        let stmt = ast.if_stmt(f, vec![r1]);
        let x = ast.arg("x", Type::Bool);
        let xid = ast.id("x");
        let two = ast.int(2);
        let r2 = ast.ret(two);
        ast.add_elsif(stmt, xid, vec![r2]);
        let t = ast.bool_lit(true);
        let four = ast.int(4);
        let y = ast.const_decl("y", four);
        let inner = ast.if_stmt(t, vec![y]);
        let three = ast.int(3);
        let r3 = ast.ret(three);
        let func = ast.function(Private, "pick", vec![x], vec![stmt, inner, r3]);
        ast.push_definition(func);
        infer(&mut ast).unwrap();

        let nodes = ast.len();
        let before = (format!("{:?}", ast.kind(stmt)), format!("{:?}", ast.kind(inner)));
        assert!(!fold_again(&mut ast, stmt));
        assert!(fold_again(&mut ast, inner));
        let after = (format!("{:?}", ast.kind(stmt)), format!("{:?}", ast.kind(inner)));
        assert_eq!(before, after);
        assert_eq!(ast.len(), nodes);
        assert!(matches!(ast.kind(inner), NodeKind::Scope { .. }));
    }

    #[test]
    fn functions_may_not_be_stored() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let r = ast.ret(one);
        let g = ast.function(Private, "g", vec![], vec![r]);
        let gid = ast.id("g");
        let v = ast.const_decl("v", gid);
        let two = ast.int(2);
        let r2 = ast.ret(two);
        let f = ast.function(Private, "f", vec![], vec![v, r2]);
        ast.push_definition(g);
        ast.push_definition(f);
        let err = infer(&mut ast).unwrap_err();
        assert_eq!(err.category, Category::NotSupported);
    }

    #[test]
    fn definitions_interleave_after_their_functions() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let r = ast.ret(one);
        let a = ast.function(Private, "a", vec![], vec![r]);
        let seven = ast.int(7);
        let c = ast.const_decl("c", seven);
        let bcall = ast.call("a", vec![]);
        let rb = ast.ret(bcall);
        let b = ast.function(Private, "b", vec![], vec![rb]);
        ast.push_definition(b);
        ast.push_definition(c);
        ast.push_definition(a);
        let order = validate_functions(&mut ast).unwrap();
        let work = processing_order(&ast, order);
        let names: Vec<_> = work.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
