//! `foreach(list, func)` typing.
//!
//! The function is either an anonymous function taking the item and
//! optionally the index, or the name of a function taking just the item.
//! The result is a list of what the function returns, as long as the
//! input.

use crystal_ast::{NodeId, NodeKind};
use crystal_diag::{Category, Diagnostic};
use crystal_types::{Type, equal};

use crate::coerce::unwrap_optional;
use crate::typeck::Infer;

impl Infer<'_> {
    pub(crate) fn fill_foreach(
        &mut self,
        node: NodeId,
        list: NodeId,
        func: NodeId,
        scopes: &[NodeId],
    ) -> Result<(), Diagnostic> {
        self.fill_expr(list, scopes)?;
        if !self.check(&[list], None)? {
            return Ok(());
        }
        if self.ast.ty(list).size() == Some(0) {
            // Nothing to iterate.
            self.ast.raise_child(node, list);
            return Ok(());
        }
        unwrap_optional(self.ast, list);
        let list_ty = self.ast.ty(list).clone();
        let Type::List(item, size) = &list_ty else {
            return Err(Diagnostic::error(
                Category::Syntax,
                format!("the first argument to foreach must be a list<*>, got {list_ty}"),
            ));
        };

        let anon = self.ast.func(func).is_some_and(|f| f.anon);
        let ret = if anon {
            self.fill_foreach_body(func, item, *size, scopes)?
        } else {
            self.foreach_named(func, item, scopes)?
        };
        if let Some(ret) = ret {
            self.ast.set_ty(node, Type::list(ret, *size));
        }
        Ok(())
    }

    fn fill_foreach_body(
        &mut self,
        func: NodeId,
        item: &Type,
        size: Option<u128>,
        scopes: &[NodeId],
    ) -> Result<Option<Type>, Diagnostic> {
        let args = self.ast.func(func).map(|f| f.args.clone()).unwrap_or_default();
        if args.is_empty() || args.len() > 2 {
            return Err(Diagnostic::error(
                Category::Argument,
                "anonymous function in foreach must have 1 or 2 arguments (for the item and optionally for the index)",
            ));
        }
        self.ast.set_ty(args[0], item.clone());
        if let Some(&index) = args.get(1) {
            self.ast.set_ty(index, Type::Uint);
        }
        if let Some(def) = self.ast.func_mut(func) {
            def.foreach_list_size = size;
        }
        self.fill_expr(func, scopes)?;
        if !self.check(&[func], None)? {
            return Ok(None);
        }
        Ok(Some(self.ast.ty(func).clone()))
    }

    fn foreach_named(&mut self, func: NodeId, item: &Type, scopes: &[NodeId]) -> Result<Option<Type>, Diagnostic> {
        self.fill_expr(func, scopes)?;
        if !self.check(&[func], None)? {
            return Ok(None);
        }
        let def = match self.ast.ty(func) {
            Type::Func(fref) if matches!(self.ast.kind(fref.def), NodeKind::Func(_)) => fref.def,
            _ => {
                return Err(Diagnostic::error(
                    Category::Syntax,
                    "the second argument to foreach must be a function name or an anonymous function definition",
                ));
            }
        };
        let Some(callee) = self.ast.func(def) else {
            return Ok(None);
        };
        let name = callee.display_name().to_string();
        if callee.uses_closure {
            return Err(Diagnostic::error(
                Category::NotSupported,
                format!("function '{name}' uses closure, which is not suppored with foreach. to use closure, use an anonymous function."),
            ));
        }
        let arg_types = self.arg_types(def);
        if arg_types.len() != 1 || !equal(&arg_types[0], item) {
            return Err(Diagnostic::error(
                Category::Argument,
                format!("foreach function '{name}' should have a single argument of type '{item}'. to access the iteration index, use an anonymous function."),
            ));
        }
        let ret = self.ast.ty(def).clone();
        if !equal(&ret, item) {
            return Err(Diagnostic::error(
                Category::Argument,
                format!("foreach function '{name}' must return a '{item}'. to return a different type, use an anonymous function."),
            ));
        }
        Ok(Some(ret))
    }
}
