//! Expression typing: literals, identifiers, operators, assignments.

use crystal_ast::{
    AssignOp, BinOp, ChainOp, Lit, NodeId, NodeKind, PersistKind, Protect, UnaryOp, VarDecl,
};
use crystal_diag::{Category, Diagnostic};
use crystal_types::{FuncRef, MapType, Type, equal, equal_strict, merge_response_types};
use indexmap::IndexMap;

use crate::coerce::{
    coerce_lit_map_values, coerce_literal, coerce_to_optional, truthy, unwrap_optional,
};
use crate::scope::{FindOpts, Resolved, push_scope};
use crate::typeck::Infer;

const INTEGERS: [Type; 2] = [Type::Int, Type::Uint];

const COMPARABLE: [Type; 5] = [
    Type::Int,
    Type::Uint,
    Type::String(None),
    Type::StringAscii(None),
    Type::Buff(None),
];

const ADDABLE: [Type; 4] = [Type::Int, Type::Uint, Type::String(None), Type::StringAscii(None)];

fn function_reference() -> Diagnostic {
    Diagnostic::error(
        Category::NotSupported,
        "variables may not hold function references in Clarity",
    )
}

fn invalid_assignment() -> Diagnostic {
    Diagnostic::error(Category::Syntax, "invalid assignment")
}

impl Infer<'_> {
    /// Type `node` and everything under it. Nodes already typed are left
    /// alone, literals excepted since their items may still be open.
    pub(crate) fn fill_expr(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        if !self.ast.is_lit(node) && !self.ast.ty(node).is_undetermined() {
            return Ok(());
        }
        let line = self.ast.line(node);
        self.fill_expr_kind(node, scopes).map_err(|e| e.or_at_line(line))
    }

    fn fill_expr_kind(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        match self.ast.kind(node).clone() {
            NodeKind::Nop => Ok(()),
            NodeKind::Lit(Lit::List(items)) => self.fill_list(node, &items, scopes),
            NodeKind::Lit(Lit::Map(fields)) => self.fill_map(node, &fields, scopes),
            NodeKind::Lit(_) => Ok(()),
            NodeKind::Id(ident) => self.fill_id(node, &ident.name, scopes),
            NodeKind::Unary { op, a } => self.fill_unary(node, op, a, scopes),
            NodeKind::Binary { op, a, b } => self.fill_binary(node, op, a, b, scopes),
            NodeKind::Chain { op, operands } => self.fill_chain(node, op, &operands, scopes),
            NodeKind::ExprIf { cond, a, b } => self.fill_expr_if(node, cond, a, b, scopes),
            NodeKind::Index { .. } => self.fill_index(node, scopes),
            NodeKind::Call { .. } => self.fill_call(node, scopes),
            NodeKind::Foreach { list, func, .. } => self.fill_foreach(node, list, func, scopes),
            NodeKind::Func(_) => self.fill_anon_func(node, scopes),
            NodeKind::Assign { op, lval, rval } => self.fill_assign(node, op, lval, rval, scopes),
            NodeKind::Delete { lval } => self.fill_delete(node, lval, scopes),
            NodeKind::CountOf { expr } => self.fill_countof(node, expr, scopes),
            NodeKind::TypeOf { expr } => {
                self.fill_expr(expr, scopes)?;
                if self.check(&[expr], None)? {
                    let ty = self.ast.ty(expr).clone();
                    self.ast
                        .reset(node, NodeKind::Lit(Lit::Typedef(ty.clone())), Type::Typedef(Box::new(ty)));
                }
                Ok(())
            }
            _ => Err(Diagnostic::internal(format!(
                "a {} cannot be used as an expression",
                self.ast.describe(node)
            ))),
        }
    }

    /// Narrow literals on either side toward the other side's type.
    fn coerce_pair(&mut self, a: NodeId, b: NodeId) {
        let tb = self.ast.ty(b).clone();
        coerce_literal(self.ast, a, &tb);
        let ta = self.ast.ty(a).clone();
        coerce_literal(self.ast, b, &ta);
    }

    fn ty_of(&self, node: NodeId) -> Type {
        self.ast.ty(node).clone()
    }

    // -----------------------------------------------------------------------
    // Literals and identifiers
    // -----------------------------------------------------------------------

    fn fill_list(&mut self, node: NodeId, items: &[NodeId], scopes: &[NodeId]) -> Result<(), Diagnostic> {
        for &item in items {
            self.fill_expr(item, scopes)?;
        }
        if items.is_empty() {
            self.ast.set_ty(node, Type::list(Type::Empty, Some(0)));
            return Ok(());
        }
        if !self.check(items, None)? {
            return Ok(());
        }

        let first = self.ty_of(items[0]);
        for (n, &item) in items.iter().enumerate().skip(1) {
            let ty = self.ty_of(item);
            // A map element may not be wider than the first one.
            let same = match first.map_fields() {
                Some(_) => equal(&first, &ty) && equal_strict(&first, &ty)?,
                None => equal(&first, &ty),
            };
            if !same {
                return Err(Diagnostic::error(
                    Category::TypeMismatch,
                    format!("list elements must all have the same type. element {n} is '{ty}', but expected '{first}'"),
                ));
            }
        }

        let mut item_ty = items
            .iter()
            .map(|&i| self.ast.ty(i))
            .find(|t| !t.is_none())
            .cloned()
            .unwrap_or(Type::None);
        if item_ty.is_callable() {
            return Err(function_reference());
        }
        if item_ty.size().is_some() {
            let widest = items.iter().filter_map(|&i| self.ast.ty(i).size()).max();
            item_ty.set_size(widest);
        }
        self.ast.set_ty(node, Type::list(item_ty, Some(items.len() as u128)));
        Ok(())
    }

    fn fill_map(
        &mut self,
        node: NodeId,
        fields: &IndexMap<String, NodeId>,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        let mut types = IndexMap::with_capacity(fields.len());
        for (key, &val) in fields {
            self.fill_expr(val, scopes)?;
            if self.ast.ty(val).is_callable() || self.names_function(val, scopes)? {
                return Err(function_reference());
            }
            types.insert(key.clone(), self.ty_of(val));
        }
        let vals: Vec<NodeId> = fields.values().copied().collect();
        if self.check(&vals, None)? {
            self.ast.set_ty(node, Type::Map(MapType::Fields(types)));
        }
        Ok(())
    }

    /// Whether `node` is an identifier naming a function, typed or not.
    fn names_function(&self, node: NodeId, scopes: &[NodeId]) -> Result<bool, Diagnostic> {
        let Some(ident) = self.ast.ident(node) else {
            return Ok(false);
        };
        let found = self
            .scopes
            .find_id(&*self.ast, scopes, &ident.name, FindOpts::syntactic())?;
        Ok(matches!(found.map(|f| f.resolved), Some(Resolved::Func(_))))
    }

    fn fill_id(&mut self, node: NodeId, name: &str, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let opts = FindOpts::declared(self.ctx.function_hoist);
        let Some(found) = self.scopes.find_id(&*self.ast, scopes, name, opts)? else {
            return Err(Diagnostic::error(Category::Syntax, format!("no such id '{name}'")));
        };
        let msg = format!("'{name}' has undetermined type");
        match found.resolved {
            Resolved::Decl(decl) => {
                if let NodeKind::Id(ident) = self.ast.kind_mut(node) {
                    ident.decl = Some(decl);
                }
                if self.check(&[decl], Some(&msg))? {
                    let ty = self.ty_of(decl);
                    self.ast.set_ty(node, ty);
                }
            }
            Resolved::Func(def) => {
                if self.check(&[def], Some(&msg))? {
                    self.ast
                        .set_ty(node, Type::Func(FuncRef { def, implementor: None }));
                }
            }
            Resolved::Builtin(builtin) => {
                self.ast.set_ty(node, Type::Builtin(builtin.name.to_string()));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    fn fill_unary(&mut self, node: NodeId, op: UnaryOp, a: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        self.fill_expr(a, scopes)?;
        if !self.check(&[a], None)? {
            return Ok(());
        }
        let color = format!("operator '{}'", op.as_str());
        match op {
            UnaryOp::Not => {
                truthy(self.ast, a);
                self.ensure_type(self.ast.ty(a), &Type::Bool, Some(&color))?;
                self.ast.set_ty(node, Type::Bool);
            }
            UnaryOp::BitNot => {
                unwrap_optional(self.ast, a);
                self.ensure_one_of(self.ast.ty(a), &INTEGERS, Some(&color))?;
                let ty = self.ty_of(a);
                self.ast.set_ty(node, ty);
            }
            UnaryOp::Plus => {
                unwrap_optional(self.ast, a);
                self.ensure_one_of(self.ast.ty(a), &INTEGERS, Some(&color))?;
                self.ast.raise_child(node, a);
            }
            UnaryOp::Negate => {
                if let Some(Lit::Int(v)) = self.ast.lit(a)
                    && let Some(negated) = v.checked_neg()
                {
                    self.ast.reset(node, NodeKind::Lit(Lit::Int(negated)), Type::Int);
                    return Ok(());
                }
                if let NodeKind::Unary { op: UnaryOp::Negate, a: inner } = *self.ast.kind(a) {
                    self.ast.raise_child(node, inner);
                    return Ok(());
                }
                unwrap_optional(self.ast, a);
                self.ensure_type(self.ast.ty(a), &Type::Int, Some(&color))?;
                self.ast.set_ty(node, Type::Int);
            }
            UnaryOp::Unwrap => {
                if self.ast.ty(a).is_response() {
                    return Err(Diagnostic::error(
                        Category::Syntax,
                        "operator '#' does not work with response types. to unwrap responses, use <response>.errval and <response>.okval",
                    ));
                }
                unwrap_optional(self.ast, a);
                self.ast.raise_child(node, a);
            }
            UnaryOp::ToInt | UnaryOp::ToUint => {
                let (to, from) = if op == UnaryOp::ToInt {
                    (Type::Int, Type::Uint)
                } else {
                    (Type::Uint, Type::Int)
                };
                unwrap_optional(self.ast, a);
                if *self.ast.ty(a) == to || coerce_literal(self.ast, a, &to) {
                    self.ast.raise_child(node, a);
                } else {
                    self.ensure_type(self.ast.ty(a), &from, Some(&color))?;
                    self.ast.set_ty(node, to);
                }
            }
            UnaryOp::ToPrincipal => {
                if *self.ast.ty(a) == Type::Principal {
                    self.ast.raise_child(node, a);
                    return Ok(());
                }
                self.ensure_one_of(
                    self.ast.ty(a),
                    &[Type::String(None), Type::StringAscii(None)],
                    Some(&color),
                )?;
                let Some(text) = self.ast.lit_text(a).map(str::to_string) else {
                    return Err(Diagnostic::error(
                        Category::NotSupported,
                        "principals given as expressions aren't supported by clarity",
                    ));
                };
                self.ast.reset(node, NodeKind::Lit(Lit::Str(text)), Type::Principal);
            }
            UnaryOp::Some => {
                let ty = self.ty_of(a);
                if ty.is_none() {
                    return Err(Diagnostic::error(
                        Category::Syntax,
                        "optional(none) is not allowable. just use 'none'",
                    ));
                }
                if ty.is_optional() {
                    self.ast.raise_child(node, a);
                } else if ty.is_callable() {
                    return Err(Diagnostic::error(
                        Category::Syntax,
                        "function references cannot be optional",
                    ));
                } else {
                    self.ast.set_ty(node, Type::optional(ty));
                }
            }
        }
        Ok(())
    }

    fn fill_binary(
        &mut self,
        node: NodeId,
        op: BinOp,
        a: NodeId,
        b: NodeId,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        self.fill_expr(a, scopes)?;
        self.fill_expr(b, scopes)?;
        if !self.check(&[a, b], None)? {
            return Ok(());
        }
        let color = format!("operator '{}'", op.as_str());
        match op {
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                unwrap_optional(self.ast, a);
                unwrap_optional(self.ast, b);
                self.coerce_pair(a, b);
                self.ensure_equal(self.ast.ty(a), self.ast.ty(b), Some(&color))?;
                self.ensure_one_of(self.ast.ty(a), &COMPARABLE, Some(&color))?;
                self.ast.set_ty(node, Type::Bool);
            }
            BinOp::Eq | BinOp::Ne => self.fill_equality(node, op, a, b, &color)?,
            BinOp::Shl | BinOp::Shr => {
                coerce_literal(self.ast, b, &Type::Uint);
                self.ensure_type(self.ast.ty(b), &Type::Uint, Some(&color))?;
                self.ensure_one_of(self.ast.ty(a), &INTEGERS, Some(&color))?;
                let ty = self.ty_of(a);
                self.ast.set_ty(node, ty);
            }
            BinOp::BitXor | BinOp::BitAnd | BinOp::BitOr | BinOp::Mod | BinOp::Pow => {
                unwrap_optional(self.ast, a);
                unwrap_optional(self.ast, b);
                self.coerce_pair(a, b);
                self.ensure_equal(self.ast.ty(a), self.ast.ty(b), Some(&color))?;
                self.ensure_one_of(self.ast.ty(a), &INTEGERS, Some(&color))?;
                let ty = self.ty_of(a);
                self.ast.set_ty(node, ty);
            }
        }
        Ok(())
    }

    fn fill_equality(&mut self, node: NodeId, op: BinOp, a: NodeId, b: NodeId, color: &str) -> Result<(), Diagnostic> {
        let (ta, tb) = (self.ty_of(a), self.ty_of(b));
        if ta.is_none() || tb.is_none() {
            let other = if ta.is_none() { &tb } else { &ta };
            if other.is_optional() {
                self.ast.set_ty(node, Type::Bool);
            } else {
                // A plain value is never none.
                self.ast
                    .reset(node, NodeKind::Lit(Lit::Bool(op == BinOp::Ne)), Type::Bool);
            }
            return Ok(());
        }
        match (ta.is_optional(), tb.is_optional()) {
            (true, false) => {
                if let Some(item) = ta.item_type() {
                    coerce_literal(self.ast, b, &item);
                }
                coerce_to_optional(self.ast, b);
            }
            (false, true) => {
                if let Some(item) = tb.item_type() {
                    coerce_literal(self.ast, a, &item);
                }
                coerce_to_optional(self.ast, a);
            }
            _ => self.coerce_pair(a, b),
        }
        self.ensure_equal(self.ast.ty(a), self.ast.ty(b), Some(color))?;
        self.ast.set_ty(node, Type::Bool);
        Ok(())
    }

    fn fill_chain(&mut self, node: NodeId, op: ChainOp, operands: &[NodeId], scopes: &[NodeId]) -> Result<(), Diagnostic> {
        for &operand in operands {
            self.fill_expr(operand, scopes)?;
        }
        if !self.check(operands, None)? {
            return Ok(());
        }
        let color = format!("operator '{}'", op.as_str());
        let &[a, b] = operands else {
            // Already flattened: the operands agree.
            let first = self.ty_of(operands[0]);
            for &operand in &operands[1..] {
                self.ensure_equal(&first, self.ast.ty(operand), Some(&color))?;
            }
            self.ast.set_ty(node, first);
            return Ok(());
        };
        if matches!(op, ChainOp::And | ChainOp::Or) {
            return self.fill_logical(node, op, a, b, &color);
        }

        unwrap_optional(self.ast, a);
        unwrap_optional(self.ast, b);
        self.coerce_pair(a, b);
        self.ensure_equal(self.ast.ty(a), self.ast.ty(b), Some(&color))?;
        let valid: &[Type] = if op == ChainOp::Add { &ADDABLE } else { &INTEGERS };
        self.ensure_one_of(self.ast.ty(a), valid, Some(&color))?;

        let ty = self.ty_of(a);
        if matches!(ty, Type::String(_) | Type::StringAscii(_)) {
            return self.fill_concatenation(node, a, b, ty);
        }
        if self.optimize && self.fold_arithmetic(node, op, a, b) {
            return Ok(());
        }
        self.flatten(node, op, a, b);
        self.ast.set_ty(node, ty);
        Ok(())
    }

    /// `+` on strings: literals merge, otherwise the sizes add up.
    fn fill_concatenation(&mut self, node: NodeId, a: NodeId, b: NodeId, mut ty: Type) -> Result<(), Diagnostic> {
        if let (Some(Lit::Str(x)), Some(Lit::Str(y))) = (self.ast.lit(a), self.ast.lit(b)) {
            let merged = format!("{x}{y}");
            ty.set_size(Some(merged.chars().count() as u128));
            self.ast.reset(node, NodeKind::Lit(Lit::Str(merged)), ty);
            return Ok(());
        }
        let size = match (self.ast.ty(a).size(), self.ast.ty(b).size()) {
            (Some(x), Some(y)) => Some(x + y),
            _ => None,
        };
        ty.set_size(size);
        self.ast.set_ty(node, ty);
        Ok(())
    }

    /// Compute literal arithmetic. Overflow and division by zero are left
    /// for the runtime to report.
    fn fold_arithmetic(&mut self, node: NodeId, op: ChainOp, a: NodeId, b: NodeId) -> bool {
        let folded = match (self.ast.lit(a), self.ast.lit(b)) {
            (Some(Lit::Int(x)), Some(Lit::Int(y))) => {
                let (x, y) = (*x, *y);
                match op {
                    ChainOp::Add => x.checked_add(y),
                    ChainOp::Sub => x.checked_sub(y),
                    ChainOp::Mul => x.checked_mul(y),
                    ChainOp::Div => x.checked_div(y),
                    ChainOp::And | ChainOp::Or => None,
                }
                .map(|v| (Lit::Int(v), Type::Int))
            }
            (Some(Lit::Uint(x)), Some(Lit::Uint(y))) => {
                let (x, y) = (*x, *y);
                match op {
                    ChainOp::Add => x.checked_add(y),
                    ChainOp::Sub => x.checked_sub(y),
                    ChainOp::Mul => x.checked_mul(y),
                    ChainOp::Div => x.checked_div(y),
                    ChainOp::And | ChainOp::Or => None,
                }
                .map(|v| (Lit::Uint(v), Type::Uint))
            }
            _ => None,
        };
        match folded {
            Some((lit, ty)) => {
                self.ast.reset(node, NodeKind::Lit(lit), ty);
                true
            }
            None => false,
        }
    }

    /// `(a op b) op c` becomes one chain when optimizing.
    fn flatten(&mut self, node: NodeId, op: ChainOp, a: NodeId, b: NodeId) {
        if !self.optimize {
            return;
        }
        let NodeKind::Chain { op: inner_op, operands } = self.ast.kind(a) else {
            return;
        };
        if *inner_op != op {
            return;
        }
        let mut merged = operands.clone();
        merged.push(b);
        *self.ast.kind_mut(node) = NodeKind::Chain { op, operands: merged };
    }

    fn fill_logical(&mut self, node: NodeId, op: ChainOp, a: NodeId, b: NodeId, color: &str) -> Result<(), Diagnostic> {
        truthy(self.ast, a);
        truthy(self.ast, b);
        self.ensure_type(self.ast.ty(a), &Type::Bool, Some(color))?;
        self.ensure_type(self.ast.ty(b), &Type::Bool, Some(color))?;

        if self.optimize {
            // The value that decides the outcome by itself.
            let decisive = op == ChainOp::Or;
            let (la, lb) = (self.ast.lit_bool(a), self.ast.lit_bool(b));
            if la == Some(decisive) || lb == Some(decisive) {
                self.ast
                    .reset(node, NodeKind::Lit(Lit::Bool(decisive)), Type::Bool);
                return Ok(());
            }
            if la == Some(!decisive) {
                self.ast.raise_child(node, b);
                return Ok(());
            }
            if lb == Some(!decisive) {
                self.ast.raise_child(node, a);
                return Ok(());
            }
        }
        self.flatten(node, op, a, b);
        self.ast.set_ty(node, Type::Bool);
        Ok(())
    }

    fn fill_expr_if(
        &mut self,
        node: NodeId,
        cond: NodeId,
        a: NodeId,
        b: NodeId,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        self.fill_expr(cond, scopes)?;
        self.fill_expr(a, scopes)?;
        self.fill_expr(b, scopes)?;
        if !self.check(&[cond, a, b], None)? {
            return Ok(());
        }
        truthy(self.ast, cond);
        let cond_ty = self.ast.ty(cond);
        if *cond_ty != Type::Bool {
            return Err(Diagnostic::error(
                Category::TypeMismatch,
                format!("expecting left-side of '?' expression to be bool but got {cond_ty}"),
            ));
        }

        let (ta, tb) = (self.ty_of(a), self.ty_of(b));
        if ta.is_none() && !tb.is_optional() {
            coerce_to_optional(self.ast, b);
        } else if tb.is_none() && !ta.is_optional() {
            coerce_to_optional(self.ast, a);
        }
        self.coerce_pair(a, b);
        let (ta, tb) = (self.ty_of(a), self.ty_of(b));
        if !equal(&ta, &tb) {
            return Err(Diagnostic::error(
                Category::TypeMismatch,
                format!("both 'then' and 'else' expressions of '?' must be the same type. got '{ta}' and '{tb}'"),
            ));
        }

        if self.optimize
            && let Some(which) = self.ast.lit_bool(cond)
        {
            self.ast.raise_child(node, if which { a } else { b });
            return Ok(());
        }

        let mut ty = ta.or_alt(&tb);
        if ty.is_response() && tb.is_response() {
            merge_response_types(&tb, &mut ty)?;
        }
        self.ast.set_ty(node, ty);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// The declaration behind an identifier node.
    fn decl_of(&self, node: NodeId) -> Option<NodeId> {
        self.ast.ident(node).and_then(|i| i.decl)
    }

    fn fill_assign(
        &mut self,
        node: NodeId,
        op: AssignOp,
        lval: NodeId,
        rval: NodeId,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        match self.ast.kind(lval).clone() {
            NodeKind::Id(_) => {
                self.fill_expr(lval, scopes)?;
                self.fill_expr(rval, scopes)?;
                if !self.check(&[lval, rval], None)? {
                    return Ok(());
                }
                if self.ast.ty(rval).is_callable() {
                    return Err(Diagnostic::error(
                        Category::Syntax,
                        "function references are not allowed",
                    ));
                }
                let decl = self.decl_of(lval);
                match decl.map(|d| self.ast.kind(d)) {
                    Some(NodeKind::VarDecl(VarDecl {
                        protect: Protect::Const,
                        ..
                    })) => Err(Diagnostic::error(Category::Syntax, "const is not assignable")),
                    Some(NodeKind::Persist(p))
                        if matches!(p.kind, PersistKind::DataVar { .. }) && op == AssignOp::Set =>
                    {
                        let declared = self.ty_of(lval);
                        coerce_literal(self.ast, rval, &declared);
                        coerce_lit_map_values(self.ast, &declared, rval);
                        self.ensure_equal(&declared, self.ast.ty(rval), Some("assignment"))?;
                        self.ast.set_ty(node, Type::Bool);
                        Ok(())
                    }
                    _ => Err(invalid_assignment()),
                }
            }
            NodeKind::Index {
                expr: Some(map), key, ..
            } => {
                self.fill_expr(map, scopes)?;
                self.fill_expr(key, scopes)?;
                self.fill_expr(rval, scopes)?;
                if !self.check(&[map, key, rval], None)? {
                    return Ok(());
                }
                if self.ast.ty(rval).is_callable() {
                    return Err(Diagnostic::error(
                        Category::Syntax,
                        "function references are not allowed",
                    ));
                }
                let Type::DataMap(key_ty, val_ty) = self.ty_of(map) else {
                    return Err(invalid_assignment());
                };
                self.fit_datamap_key(key, &key_ty);
                unwrap_optional(self.ast, rval);
                coerce_lit_map_values(self.ast, &val_ty, rval);
                coerce_literal(self.ast, rval, &val_ty);

                let got_key = self.ty_of(key);
                if !equal_strict(&key_ty, &got_key)? {
                    return Err(Diagnostic::error(
                        Category::TypeMismatch,
                        format!("assignment. the key types '{key_ty}' and '{got_key}' are incompatible"),
                    ));
                }
                let got_val = self.ty_of(rval);
                if !equal_strict(&val_ty, &got_val)? {
                    return Err(Diagnostic::error(
                        Category::TypeMismatch,
                        format!("assignment. the type accepted as the value '{val_ty}' is incompatible with '{got_val}'"),
                    ));
                }
                self.ast.set_ty(lval, Type::Optional(val_ty));
                self.ast.set_ty(node, Type::Bool);
                Ok(())
            }
            _ => Err(invalid_assignment()),
        }
    }

    /// Adjust a key expression to a datamap's key type.
    pub(crate) fn fit_datamap_key(&mut self, key: NodeId, key_ty: &Type) {
        unwrap_optional(self.ast, key);
        if matches!(self.ast.lit(key), Some(Lit::Map(_))) {
            coerce_lit_map_values(self.ast, key_ty, key);
        } else {
            coerce_literal(self.ast, key, key_ty);
        }
    }

    fn fill_delete(&mut self, node: NodeId, lval: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        match self.ast.kind(lval).clone() {
            NodeKind::Index {
                expr: Some(map), key, ..
            } => {
                self.fill_expr(map, scopes)?;
                self.fill_expr(key, scopes)?;
                if !self.check(&[map, key], None)? {
                    return Ok(());
                }
                let Type::DataMap(key_ty, val_ty) = self.ty_of(map) else {
                    return Err(invalid_assignment());
                };
                self.fit_datamap_key(key, &key_ty);
                let got = self.ty_of(key);
                if !equal_strict(&key_ty, &got)? {
                    return Err(Diagnostic::error(
                        Category::TypeMismatch,
                        format!("delete. the types '{key_ty}' and '{got}' are incompatible"),
                    ));
                }
                self.ast.set_ty(lval, Type::Optional(val_ty));
                self.ast.set_ty(node, Type::Bool);
                Ok(())
            }
            NodeKind::Id(_) => {
                self.fill_expr(lval, scopes)?;
                let is_const = self.decl_of(lval).is_some_and(|d| {
                    matches!(
                        self.ast.kind(d),
                        NodeKind::VarDecl(VarDecl {
                            protect: Protect::Const,
                            ..
                        })
                    )
                });
                if is_const {
                    Err(Diagnostic::error(Category::Syntax, "can't change a const"))
                } else {
                    Err(invalid_assignment())
                }
            }
            _ => Err(invalid_assignment()),
        }
    }

    // -----------------------------------------------------------------------
    // Compile-time queries and anonymous functions
    // -----------------------------------------------------------------------

    fn fill_countof(&mut self, node: NodeId, expr: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        self.fill_expr(expr, scopes)?;
        if !self.check(&[expr], None)? {
            return Ok(());
        }
        let ty = self.ty_of(expr);
        let seq = match &ty {
            Type::Optional(item) => (**item).clone(),
            other => other.clone(),
        };
        if !seq.is_sequence() {
            return Err(Diagnostic::error(
                Category::Syntax,
                format!("'_countof' argument of type '{ty}' is not a sequence type"),
            ));
        }
        let Some(size) = seq.size() else {
            return Err(Diagnostic::error(
                Category::Syntax,
                format!("'_countof' argument of type '{ty}' has no maximum size"),
            ));
        };
        self.ast.reset(node, NodeKind::Lit(Lit::Uint(size)), Type::Uint);
        Ok(())
    }

    fn fill_anon_func(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let Some(body) = self.ast.func(node).map(|f| f.body) else {
            return Ok(());
        };
        self.fill_args(node, scopes, false)?;
        self.fill_body(body, &push_scope(scopes, node))?;
        self.settle_return_type(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_ast::{Ast, Visibility};

    use crate::typeck::{InferOptions, determine_types};
    use crate::validate_functions;

    /// Wrap `expr` in `function subject() { return expr; }` and infer.
    fn type_of(ast: &mut Ast, expr: NodeId) -> Result<Type, Diagnostic> {
        type_of_with(ast, expr, true)
    }

    fn type_of_with(ast: &mut Ast, expr: NodeId, optimize: bool) -> Result<Type, Diagnostic> {
        let ret = ast.ret(expr);
        let f = ast.function(Visibility::Private, "subject", vec![], vec![ret]);
        ast.push_definition(f);
        let order = validate_functions(ast)?;
        let mut warnings = Vec::new();
        determine_types(ast, order, &InferOptions { optimize }, &mut warnings, None)?;
        Ok(ast.ty(f).clone())
    }

    #[test]
    fn comparisons_narrow_literals() {
        let mut ast = Ast::new();
        let a = ast.uint(3);
        let b = ast.int(4);
        let lt = ast.binary(BinOp::Lt, a, b);
        assert_eq!(type_of(&mut ast, lt).unwrap(), Type::Bool);
        assert_eq!(ast.ty(b), &Type::Uint);
    }

    #[test]
    fn comparing_booleans_is_rejected() {
        let mut ast = Ast::new();
        let a = ast.bool_lit(true);
        let b = ast.bool_lit(false);
        let lt = ast.binary(BinOp::Lt, a, b);
        let err = type_of(&mut ast, lt).unwrap_err();
        assert_eq!(err.category, Category::TypeMismatch);
        assert!(err.message.starts_with("operator '<'. unsupported type. expected one of"));
    }

    #[test]
    fn none_never_equals_a_plain_value() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let none = ast.none();
        let ne = ast.binary(BinOp::Ne, one, none);
        type_of(&mut ast, ne).unwrap();
        assert_eq!(ast.lit_bool(ne), Some(true));
    }

    #[test]
    fn string_literals_concatenate() {
        let mut ast = Ast::new();
        let a = ast.string("héllo ");
        let b = ast.string("world");
        let sum = ast.chain(ChainOp::Add, a, b);
        assert_eq!(type_of(&mut ast, sum).unwrap(), Type::String(Some(11)));
        assert_eq!(ast.lit_text(sum), Some("héllo world"));
    }

    #[test]
    fn overflowing_folds_are_left_to_the_runtime() {
        let mut ast = Ast::new();
        let a = ast.uint(u128::MAX);
        let b = ast.uint(1);
        let sum = ast.chain(ChainOp::Add, a, b);
        assert_eq!(type_of(&mut ast, sum).unwrap(), Type::Uint);
        assert!(matches!(ast.kind(sum), NodeKind::Chain { .. }));
    }

    #[test]
    fn chains_flatten_when_optimizing() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Int);
        let (xa, xb, xc) = (ast.id("x"), ast.id("x"), ast.id("x"));
        let inner = ast.chain(ChainOp::Add, xa, xb);
        let outer = ast.chain(ChainOp::Add, inner, xc);
        let ret = ast.ret(outer);
        let f = ast.function(Visibility::Private, "triple", vec![x], vec![ret]);
        ast.push_definition(f);
        let order = validate_functions(&mut ast).unwrap();
        determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None).unwrap();
        let NodeKind::Chain { operands, .. } = ast.kind(outer) else {
            panic!("expected a chain");
        };
        assert_eq!(operands.len(), 3);
    }

    #[test]
    fn logical_short_circuit() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let xid = ast.id("x");
        let f = ast.bool_lit(false);
        let and = ast.chain(ChainOp::And, xid, f);
        let xid2 = ast.id("x");
        let t = ast.bool_lit(true);
        let and2 = ast.chain(ChainOp::And, t, xid2);
        let c = ast.const_decl("c", and2);
        let ret = ast.ret(and);
        let func = ast.function(Visibility::Private, "p", vec![x], vec![c, ret]);
        ast.push_definition(func);
        let order = validate_functions(&mut ast).unwrap();
        determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None).unwrap();
        assert_eq!(ast.lit_bool(and), Some(false));
        assert_eq!(ast.ident(and2).map(|i| i.name.as_str()), Some("x"));
    }

    #[test]
    fn ternary_branches_must_agree() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let cond = ast.id("x");
        let a = ast.int(1);
        let b = ast.string("no");
        let e = ast.expr_if(cond, a, b);
        let ret = ast.ret(e);
        let f = ast.function(Visibility::Private, "p", vec![x], vec![ret]);
        ast.push_definition(f);
        let order = validate_functions(&mut ast).unwrap();
        let err = determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None)
            .unwrap_err();
        assert_eq!(
            err.message,
            "both 'then' and 'else' expressions of '?' must be the same type. got 'int' and 'string[2]'"
        );
    }

    #[test]
    fn ternary_with_none_is_optional() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let cond = ast.id("x");
        let a = ast.int(1);
        let b = ast.none();
        let e = ast.expr_if(cond, a, b);
        let ret = ast.ret(e);
        let f = ast.function(Visibility::Private, "p", vec![x], vec![ret]);
        ast.push_definition(f);
        let order = validate_functions(&mut ast).unwrap();
        determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None).unwrap();
        assert_eq!(ast.ty(f), &Type::optional(Type::Int));
    }

    #[test]
    fn list_elements_must_agree() {
        let mut ast = Ast::new();
        let a = ast.int(1);
        let b = ast.bool_lit(true);
        let list = ast.list(vec![a, b]);
        let err = type_of(&mut ast, list).unwrap_err();
        assert_eq!(
            err.message,
            "list elements must all have the same type. element 1 is 'bool', but expected 'int'"
        );
    }

    #[test]
    fn lists_take_the_widest_item() {
        let mut ast = Ast::new();
        let a = ast.string("a");
        let b = ast.string("abc");
        let list = ast.list(vec![a, b]);
        assert_eq!(
            type_of(&mut ast, list).unwrap(),
            Type::list(Type::String(Some(3)), Some(2))
        );
    }

    #[test]
    fn wider_maps_may_not_follow_narrower_ones() {
        let mut ast = Ast::new();
        let (efg, hijk) = (ast.string("efg"), ast.string("hijk"));
        let narrow = ast.record(vec![("s", efg)]);
        let wide = ast.record(vec![("s", hijk)]);
        let list = ast.list(vec![narrow, wide]);
        let err = type_of(&mut ast, list).unwrap_err();
        assert_eq!(err.category, Category::Size);
    }

    #[test]
    fn narrower_maps_may_follow_wider_ones() {
        let mut ast = Ast::new();
        let (hijk, efg) = (ast.string("hijk"), ast.string("efg"));
        let wide = ast.record(vec![("s", hijk)]);
        let narrow = ast.record(vec![("s", efg)]);
        let list = ast.list(vec![wide, narrow]);
        assert_eq!(
            type_of(&mut ast, list).unwrap(),
            Type::list(Type::map([("s", Type::String(Some(4)))]), Some(2))
        );
    }

    #[test]
    fn empty_lists() {
        let mut ast = Ast::new();
        let list = ast.list(vec![]);
        assert_eq!(type_of(&mut ast, list).unwrap(), Type::list(Type::Empty, Some(0)));
    }

    #[test]
    fn countof_is_a_literal() {
        let mut ast = Ast::new();
        let a = ast.int(1);
        let b = ast.int(2);
        let list = ast.list(vec![a, b]);
        let count = ast.countof(list);
        assert_eq!(type_of(&mut ast, count).unwrap(), Type::Uint);
        assert_eq!(ast.lit(count), Some(&Lit::Uint(2)));
    }

    #[test]
    fn optional_of_none_is_rejected() {
        let mut ast = Ast::new();
        let none = ast.none();
        let some = ast.unary(UnaryOp::Some, none);
        let err = type_of(&mut ast, some).unwrap_err();
        assert_eq!(err.message, "optional(none) is not allowable. just use 'none'");
    }

    #[test]
    fn negative_literals_fold() {
        let mut ast = Ast::new();
        let five = ast.int(5);
        let neg = ast.unary(UnaryOp::Negate, five);
        assert_eq!(type_of(&mut ast, neg).unwrap(), Type::Int);
        assert_eq!(ast.lit(neg), Some(&Lit::Int(-5)));
    }

    #[test]
    fn principal_conversion_needs_a_literal() {
        let mut ast = Ast::new();
        let s = ast.string("SP000000000000000000002Q6VF78");
        let p = ast.unary(UnaryOp::ToPrincipal, s);
        assert_eq!(type_of(&mut ast, p).unwrap(), Type::Principal);
        assert_eq!(ast.lit_text(p), Some("SP000000000000000000002Q6VF78"));
    }

    #[test]
    fn data_var_assignment() {
        let mut ast = Ast::new();
        let zero = ast.uint(0);
        let counter = ast.data_var("counter", Type::Uint, zero);
        ast.push_definition(counter);
        let lhs = ast.id("counter");
        let five = ast.int(5);
        let set = ast.assign(AssignOp::Set, lhs, five);
        let t = ast.bool_lit(true);
        let ok = ast.call("ok", vec![t]);
        let ret = ast.ret(ok);
        let f = ast.function(Visibility::Public, "bump", vec![], vec![set, ret]);
        ast.push_definition(f);
        let order = validate_functions(&mut ast).unwrap();
        determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None).unwrap();
        assert_eq!(ast.ty(set), &Type::Bool);
        assert_eq!(ast.ty(five), &Type::Uint);
    }

    #[test]
    fn consts_are_read_only() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let c = ast.const_decl("limit", one);
        ast.push_definition(c);
        let lhs = ast.id("limit");
        let two = ast.int(2);
        let set = ast.assign(AssignOp::Set, lhs, two);
        let three = ast.int(3);
        let ret = ast.ret(three);
        let f = ast.function(Visibility::Private, "p", vec![], vec![set, ret]);
        ast.push_definition(f);
        let order = validate_functions(&mut ast).unwrap();
        let err = determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None)
            .unwrap_err();
        assert_eq!(err.message, "const is not assignable");
    }

    #[test]
    fn datamap_keys_must_fit() {
        let mut ast = Ast::new();
        let map = ast.data_map("balances", Type::Principal, Type::Uint);
        ast.push_definition(map);
        let m = ast.id("balances");
        let key = ast.int(1);
        let lval = ast.index(m, key);
        let v = ast.uint(10);
        let set = ast.assign(AssignOp::Set, lval, v);
        let t = ast.bool_lit(true);
        let ok = ast.call("ok", vec![t]);
        let ret = ast.ret(ok);
        let f = ast.function(Visibility::Public, "put", vec![], vec![set, ret]);
        ast.push_definition(f);
        let order = validate_functions(&mut ast).unwrap();
        let err = determine_types(&mut ast, order, &InferOptions::default(), &mut Vec::new(), None)
            .unwrap_err();
        assert_eq!(err.category, Category::TypeMismatch);
        assert!(err.message.starts_with("assignment. the key types 'principal'"));
    }

    #[test]
    fn unknown_ids() {
        let mut ast = Ast::new();
        let id = ast.id("nowhere");
        let err = type_of(&mut ast, id).unwrap_err();
        assert_eq!(err.category, Category::UndeclaredIdentifier);
    }

    #[test]
    fn folding_can_be_disabled() {
        let mut ast = Ast::new();
        let a = ast.int(2);
        let b = ast.int(3);
        let mul = ast.chain(ChainOp::Mul, a, b);
        assert_eq!(type_of_with(&mut ast, mul, false).unwrap(), Type::Int);
        assert!(matches!(ast.kind(mul), NodeKind::Chain { .. }));
    }
}
