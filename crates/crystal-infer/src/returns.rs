//! Return types of bodies and functions.

use crystal_ast::{NodeId, NodeKind};
use crystal_diag::{Category, Diagnostic};
use crystal_types::{Type, equal, merge_response_types};

use crate::builtins::by_name;
use crate::typeck::Infer;

/// The return type being accumulated, with where each part came from.
#[derive(Debug, Default)]
struct Returns {
    ty: Option<Type>,
    seen: Vec<(NodeId, Type)>,
}

impl Returns {
    fn update(&mut self, infer: &Infer<'_>, context: NodeId, ty: &Type) -> Result<(), Diagnostic> {
        if matches!(ty, Type::Unknown) {
            return Ok(());
        }
        self.seen.push((context, ty.clone()));
        let Some(current) = &mut self.ty else {
            self.ty = Some(ty.clone());
            return Ok(());
        };
        if current.is_response() && ty.is_response() {
            return match merge_response_types(ty, current) {
                Ok(_) => Ok(()),
                Err(e) if e.category == Category::TypeMismatch => Err(self.mismatch(infer)),
                Err(e) => Err(e),
            };
        }
        if !equal(current, ty) {
            return Err(self.mismatch(infer));
        }
        *current = current.or_alt(ty);
        Ok(())
    }

    fn mismatch(&self, infer: &Infer<'_>) -> Diagnostic {
        let (first, first_ty) = &self.seen[0];
        let (last, last_ty) = &self.seen[self.seen.len() - 1];
        let first_line = infer
            .ast
            .line(*first)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".to_string());
        Diagnostic::error(
            Category::TypeMismatch,
            format!("there is more than one possible return type. got {first_ty} at line {first_line} and {last_ty}"),
        )
        .at_line(infer.ast.line(*last))
    }
}

impl Infer<'_> {
    /// The type a body returns when every path through it returns,
    /// `None` otherwise. Only the body's own statements and the branch
    /// results already recorded on its conditionals are considered.
    ///
    /// With `required_by`, a body that may fall through is an error
    /// reported against that node.
    pub(crate) fn body_return_type(&self, body: NodeId, required_by: Option<NodeId>) -> Result<Option<Type>, Diagnostic> {
        let mut returns = Returns::default();
        let mut has_return = false;
        let mut partial_if = None;

        for &stmt in self.ast.stmts(body) {
            match self.ast.kind(stmt) {
                NodeKind::Return { .. } => {
                    has_return = true;
                    returns.update(self, stmt, self.ast.ty(stmt))?;
                }
                NodeKind::If(s) => {
                    let mut branches = vec![(s.body, s.body_return.as_ref())];
                    branches.extend(s.elsif.iter().map(|e| (e.body, e.body_return.as_ref())));
                    let all = branches.iter().all(|(_, r)| r.is_some()) && s.else_return.is_some();
                    let some = branches.iter().any(|(_, r)| r.is_some()) || s.else_return.is_some();
                    if let Some(else_body) = s.else_body {
                        branches.push((else_body, s.else_return.as_ref()));
                    }
                    if all {
                        has_return = true;
                        for (branch, ty) in branches {
                            if let Some(ty) = ty {
                                let context = self.ast.find_first_return(branch).unwrap_or(stmt);
                                returns.update(self, context, ty)?;
                            }
                        }
                    } else if some && partial_if.is_none() {
                        partial_if = Some(stmt);
                    }
                }
                NodeKind::Scope { body, body_return } => {
                    if let Some(ty) = body_return {
                        has_return = true;
                        let context = self.ast.find_first_return(*body).unwrap_or(stmt);
                        returns.update(self, context, ty)?;
                    }
                }
                _ => {}
            }
        }

        if let Some(required_by) = required_by
            && !has_return
        {
            return Err(match partial_if {
                Some(stmt) => Diagnostic::error(Category::Syntax, "not all execution paths return")
                    .at_line(self.ast.line(stmt)),
                None => Diagnostic::error(
                    Category::Syntax,
                    "a return statement is required by the function",
                )
                .at_line(self.ast.line(required_by)),
            });
        }
        Ok(returns.ty)
    }

    /// Return type of a function: every `return` in it and every value a
    /// failing builtin (`asserts!`, `try!`, ..) throws out of it.
    pub(crate) fn fn_return_type(&self, func: NodeId) -> Result<Type, Diagnostic> {
        let Some(def) = self.ast.func(func) else {
            return Err(Diagnostic::internal("expected a function definition"));
        };
        let name = def.display_name().to_string();
        if self.body_return_type(def.body, Some(func))?.is_none() {
            return Err(Diagnostic::error(
                Category::UndeterminedType,
                format!("function '{name}' does not return or has an undetermined type"),
            )
            .at_line(self.ast.line(func)));
        }

        let mut contributions = Vec::new();
        self.ast.walk(def.body, &mut |n| match self.ast.kind(n) {
            NodeKind::Func(_) => false,
            NodeKind::Return { .. } => {
                contributions.push((n, self.ast.ty(n).clone()));
                true
            }
            NodeKind::Call { callee, args } => {
                if let Some(thrown) = self.thrown_type(*callee, args) {
                    contributions.push((n, thrown));
                }
                true
            }
            _ => true,
        });

        let mut returns = Returns::default();
        for (context, ty) in &contributions {
            returns.update(self, *context, ty)?;
        }
        returns
            .ty
            .ok_or_else(|| Diagnostic::internal("no return type").at_line(self.ast.line(func)))
    }

    /// What a builtin call returns from the enclosing function when it
    /// fails. `try!` on a response throws only its err part.
    fn thrown_type(&self, callee: NodeId, args: &[NodeId]) -> Option<Type> {
        let Type::Builtin(name) = self.ast.ty(callee) else {
            return None;
        };
        let idx = by_name(name)?.thrown_arg?;
        let thrown = self.ast.ty(*args.get(idx)?).clone();
        if name == "try!"
            && let Type::Response(r) = &thrown
        {
            return Some(Type::response(None, r.err.as_deref().cloned()));
        }
        Some(thrown)
    }
}

#[cfg(test)]
mod tests {
    use crystal_ast::{Ast, Visibility::*};
    use crystal_diag::Category;
    use crystal_types::Type;

    use crate::typeck::{InferOptions, determine_types};
    use crate::validate_functions;

    fn run(ast: &mut Ast) -> Result<(), crystal_diag::Diagnostic> {
        let order = validate_functions(ast)?;
        determine_types(ast, order, &InferOptions::default(), &mut Vec::new(), None)
    }

    #[test]
    fn responses_merge_across_returns() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let cond = ast.id("x");
        let one = ast.uint(1);
        let err = ast.call("err", vec![one]);
        let r1 = ast.ret(err);
        let stmt = ast.if_stmt(cond, vec![r1]);
        let t = ast.bool_lit(true);
        let ok = ast.call("ok", vec![t]);
        let r2 = ast.ret(ok);
        let f = ast.function(Public, "run", vec![x], vec![stmt, r2]);
        ast.push_definition(f);
        run(&mut ast).unwrap();
        assert_eq!(ast.ty(f), &Type::response(Some(Type::Bool), Some(Type::Uint)));
    }

    #[test]
    fn conflicting_returns() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let cond = ast.id("x");
        let one = ast.uint(1);
        let r1 = ast.ret(one);
        ast.at(r1, 3);
        let stmt = ast.if_stmt(cond, vec![r1]);
        let s = ast.string("a");
        let r2 = ast.ret(s);
        ast.at(r2, 5);
        let f = ast.function(Private, "mixed", vec![x], vec![stmt, r2]);
        ast.push_definition(f);
        let err = run(&mut ast).unwrap_err();
        assert_eq!(err.category, Category::TypeMismatch);
        assert_eq!(
            err.message,
            "there is more than one possible return type. got uint at line 3 and string[1]"
        );
        assert_eq!(err.line(), Some(5));
    }

    #[test]
    fn partial_returns_are_reported() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let cond = ast.id("x");
        let one = ast.uint(1);
        let r1 = ast.ret(one);
        let stmt = ast.if_stmt(cond, vec![r1]);
        ast.at(stmt, 2);
        let f = ast.function(Private, "maybe", vec![x], vec![stmt]);
        ast.push_definition(f);
        let err = run(&mut ast).unwrap_err();
        assert_eq!(err.message, "not all execution paths return");
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn if_else_returning_on_both_sides() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let cond = ast.id("x");
        let one = ast.int(1);
        let r1 = ast.ret(one);
        let two = ast.int(2);
        let r2 = ast.ret(two);
        let stmt = ast.if_else(cond, vec![r1], vec![r2]);
        let f = ast.function(Private, "pick", vec![x], vec![stmt]);
        ast.push_definition(f);
        run(&mut ast).unwrap();
        assert_eq!(ast.ty(f), &Type::Int);
    }

    #[test]
    fn thrown_values_shape_the_return_type() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Bool);
        let cond = ast.id("x");
        let code = ast.uint(403);
        let e = ast.call("err", vec![code]);
        let check = ast.call("asserts!", vec![cond, e]);
        let t = ast.bool_lit(true);
        let ok = ast.call("ok", vec![t]);
        let r = ast.ret(ok);
        let f = ast.function(Public, "guarded", vec![x], vec![check, r]);
        ast.push_definition(f);
        run(&mut ast).unwrap();
        assert_eq!(ast.ty(f), &Type::response(Some(Type::Bool), Some(Type::Uint)));
    }
}
