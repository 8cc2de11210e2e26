//! Call typing: user functions, builtins and calls into other contracts.

use crystal_ast::{Ident, NodeId, NodeKind, Visibility};
use crystal_diag::{Category, Diagnostic};
use crystal_types::Type;

use crate::abi::{AbiArg, AbiEntry, resolve};
use crate::builtins::{CallSite, Fill, by_name};
use crate::coerce::{coerce_call_args, unwrap_optional};
use crate::typeck::Infer;

/// Signatures of a callable value.
#[derive(Debug)]
pub(crate) struct Callable {
    pub name: String,
    pub entries: Vec<AbiEntry>,
    pub uses_closure: bool,
    /// A user function rather than a builtin.
    pub user: bool,
}

impl Infer<'_> {
    pub(crate) fn fill_call(&mut self, node: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let NodeKind::Call { callee, args } = self.ast.kind(node).clone() else {
            return Err(Diagnostic::internal("expected a call"));
        };
        self.fill_expr(callee, scopes)?;
        if !self.check(&[callee], None)? {
            return Ok(());
        }
        let callee_ty = self.ast.ty(callee).clone();
        if !callee_ty.is_callable() {
            return Err(Diagnostic::error(
                Category::TypeMismatch,
                format!("function. unsupported type. expected one of 'func,syscall_ref' but got '{callee_ty}'"),
            ));
        }

        for &arg in &args {
            self.fill_expr(arg, scopes)?;
        }
        if !self.check(&args, None)? {
            return Ok(());
        }

        if let Type::Func(fref) = &callee_ty {
            if matches!(self.ast.kind(fref.def), NodeKind::ExternFunc(_)) {
                return self.rewrite_as_contract_call(node, callee, args, scopes);
            }
            self.ensure_no_readonly_violation(fref.def, scopes)?;
        }

        // Receivers bound by property access lead the arguments.
        let mut args = args;
        let bound = self.ast.ident(callee).map(|i| i.bind.clone()).unwrap_or_default();
        if !bound.is_empty() {
            args.splice(0..0, bound);
            if let NodeKind::Id(ident) = self.ast.kind_mut(callee) {
                ident.bind.clear();
            }
            if let NodeKind::Call { args: call_args, .. } = self.ast.kind_mut(node) {
                *call_args = args.clone();
            }
        }

        let callable = self.callable(&callee_ty)?;
        if let Type::Func(fref) = &callee_ty {
            let declared = self.arg_types(fref.def);
            coerce_call_args(self.ast, &declared, &args);
        }
        let arg_types: Vec<Type> = args.iter().map(|&a| self.ast.ty(a).clone()).collect();
        let matched = resolve(&callable.name, &callable.entries, &arg_types, true)?;
        for &idx in &matched.unwrap {
            unwrap_optional(self.ast, args[idx]);
        }

        match &callee_ty {
            Type::Builtin(name) => {
                let builtin = by_name(name)
                    .ok_or_else(|| Diagnostic::internal(format!("unknown builtin '{name}'")))?;
                let site = CallSite {
                    node,
                    args,
                    entry: matched.entry,
                    index: matched.index,
                    scopes,
                };
                let filled = match builtin.fill {
                    Fill::Ret => {
                        self.ast.set_ty(node, site.entry.ret.clone());
                        Ok(())
                    }
                    Fill::FirstArg => {
                        let ty = site.args.first().map(|&a| self.ast.ty(a).clone()).unwrap_or_default();
                        self.ast.set_ty(node, ty);
                        Ok(())
                    }
                    Fill::Custom(fill) => fill(self, &site),
                };
                filled.or_else(|e| self.undetermined(e))
            }
            Type::Func(fref) => {
                let msg = format!("unresolved function '{}'", callable.name);
                if self.check(&[fref.def], Some(&msg))? {
                    let ret = self.ast.ty(fref.def).clone();
                    self.ast.set_ty(node, ret);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `alias.fn(args)` becomes `contract-call?(alias.fn, args)`.
    fn rewrite_as_contract_call(
        &mut self,
        node: NodeId,
        callee: NodeId,
        args: Vec<NodeId>,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        let name = "contract-call?";
        let contract_call = self.ast.alloc_typed(
            NodeKind::Id(Ident {
                name: name.to_string(),
                decl: None,
                bind: Vec::new(),
            }),
            Type::Builtin(name.to_string()),
        );
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(callee);
        call_args.extend(args);
        self.ast.reset(
            node,
            NodeKind::Call {
                callee: contract_call,
                args: call_args,
            },
            Type::Unknown,
        );
        self.fill_call(node, scopes)
    }

    /// Signatures of a function or builtin reference.
    pub(crate) fn callable(&self, ty: &Type) -> Result<Callable, Diagnostic> {
        match ty {
            Type::Func(fref) => {
                let (name, uses_closure) = match self.ast.kind(fref.def) {
                    NodeKind::Func(def) => (def.display_name().to_string(), def.uses_closure),
                    NodeKind::ExternFunc(f) => (f.name.clone(), false),
                    _ => return Err(Diagnostic::internal("function reference to a non-function")),
                };
                Ok(Callable {
                    name,
                    entries: vec![self.signature_of(fref.def)],
                    uses_closure,
                    user: true,
                })
            }
            Type::Builtin(name) => {
                let builtin = by_name(name)
                    .ok_or_else(|| Diagnostic::internal(format!("unknown builtin '{name}'")))?;
                Ok(Callable {
                    name: name.clone(),
                    entries: builtin.abi(),
                    uses_closure: false,
                    user: false,
                })
            }
            other => Err(Diagnostic::error(
                Category::TypeMismatch,
                format!("unsupported type. expected one of 'func,syscall_ref' but got '{other}'"),
            )),
        }
    }

    pub(crate) fn arg_types(&self, def: NodeId) -> Vec<Type> {
        let args = match self.ast.kind(def) {
            NodeKind::Func(f) => &f.args,
            NodeKind::ExternFunc(f) => &f.args,
            _ => return Vec::new(),
        };
        args.iter().map(|&a| self.ast.ty(a).clone()).collect()
    }

    pub(crate) fn signature_of(&self, def: NodeId) -> AbiEntry {
        AbiEntry::new(
            self.arg_types(def).into_iter().map(AbiArg::Ty).collect(),
            self.ast.ty(def).clone(),
        )
    }

    /// Reject calls from a read-only function to one that may write.
    ///
    /// A callee writes when it is not read-only itself and its return type
    /// can succeed.
    pub(crate) fn ensure_no_readonly_violation(&self, callee: NodeId, scopes: &[NodeId]) -> Result<(), Diagnostic> {
        let caller = scopes
            .iter()
            .rev()
            .find(|&&s| self.ast.func(s).is_some_and(|f| !f.anon));
        let Some(caller) = caller.and_then(|&s| self.ast.func(s)) else {
            return Ok(());
        };
        if caller.vis != Visibility::ReadOnly {
            return Ok(());
        }
        let (name, vis) = match self.ast.kind(callee) {
            NodeKind::Func(def) => (def.display_name().to_string(), def.vis),
            NodeKind::ExternFunc(f) => (f.name.clone(), f.vis),
            _ => return Ok(()),
        };
        if vis == Visibility::ReadOnly {
            return Ok(());
        }
        let ret = self.ast.ty(callee);
        if !ret.is(&Type::ok_response_of_any()) {
            return Ok(());
        }
        let message = if ret.err_type().is_none() {
            format!("call to write-only function '{name}' from a read-only function")
        } else {
            format!("call to function '{name}' that performs writes from a read-only function")
        };
        Err(Diagnostic::error(Category::ReadOnlyViolation, message))
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
    fn calls_take_the_callee_return_type() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Uint);
        let xid = ast.id("x");
        let r = ast.ret(xid);
        let id = ast.function(Private, "id", vec![x], vec![r]);
        let seven = ast.int(7);
        let call = ast.call("id", vec![seven]);
        let r2 = ast.ret(call);
        let user = ast.function(Private, "user", vec![], vec![r2]);
        ast.push_definition(user);
        ast.push_definition(id);
        run(&mut ast).unwrap();
        assert_eq!(ast.ty(call), &Type::Uint);
        assert_eq!(ast.ty(seven), &Type::Uint);
    }

    #[test]
    fn argument_mismatches_are_reported() {
        let mut ast = Ast::new();
        let x = ast.arg("x", Type::Uint);
        let xid = ast.id("x");
        let r = ast.ret(xid);
        let id = ast.function(Private, "id", vec![x], vec![r]);
        let flag = ast.bool_lit(true);
        let call = ast.call("id", vec![flag]);
        let r2 = ast.ret(call);
        let user = ast.function(Private, "user", vec![], vec![r2]);
        ast.push_definition(id);
        ast.push_definition(user);
        let err = run(&mut ast).unwrap_err();
        assert_eq!(err.category, Category::TypeMismatch);
        assert_eq!(err.message, "argument 1 to id is a 'bool' but expected 'uint'");
    }

    #[test]
    fn read_only_functions_may_not_call_writers() {
        let mut ast = Ast::new();
        let t = ast.bool_lit(true);
        let ok = ast.call("ok", vec![t]);
        let r = ast.ret(ok);
        let writer = ast.function(Public, "write", vec![], vec![r]);
        let call = ast.call("write", vec![]);
        let r2 = ast.ret(call);
        let reader = ast.function(ReadOnly, "read", vec![], vec![r2]);
        ast.push_definition(writer);
        ast.push_definition(reader);
        let err = run(&mut ast).unwrap_err();
        assert_eq!(err.category, Category::ReadOnlyViolation);
        assert_eq!(
            err.message,
            "call to write-only function 'write' from a read-only function"
        );
    }

    #[test]
    fn read_only_functions_may_call_each_other() {
        let mut ast = Ast::new();
        let t = ast.bool_lit(true);
        let ok = ast.call("ok", vec![t]);
        let r = ast.ret(ok);
        let a = ast.function(ReadOnly, "a", vec![], vec![r]);
        let call = ast.call("a", vec![]);
        let r2 = ast.ret(call);
        let b = ast.function(ReadOnly, "b", vec![], vec![r2]);
        ast.push_definition(a);
        ast.push_definition(b);
        run(&mut ast).unwrap();
    }

    #[test]
    fn non_functions_cannot_be_called() {
        let mut ast = Ast::new();
        let one = ast.int(1);
        let c = ast.const_decl("c", one);
        ast.push_definition(c);
        let callee = ast.id("c");
        let call = ast.call_expr(callee, vec![]);
        let r = ast.ret(call);
        let f = ast.function(Private, "f", vec![], vec![r]);
        ast.push_definition(f);
        let err = run(&mut ast).unwrap_err();
        assert_eq!(
            err.message,
            "function. unsupported type. expected one of 'func,syscall_ref' but got 'int'"
        );
    }
}
