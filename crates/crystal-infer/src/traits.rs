//! Trait implementation checks.
//!
//! A contract implements a trait with `implement trait x.y;`. Every
//! function named like a member of an implemented trait must match the
//! member's signature, and every member must be implemented.

use std::collections::BTreeMap;

use crystal_ast::{Ast, NodeId, NodeKind, Visibility};
use crystal_diag::{Category, Diagnostic};
use crystal_types::{Type, fits, pretty_types};

use crate::typeck::Infer;

/// Visibility, argument types and return type of a function or member.
struct Signature {
    vis: Visibility,
    args: String,
    ret: Type,
}

impl Signature {
    fn of(ast: &Ast, def: NodeId) -> Option<Self> {
        let (vis, args) = match ast.kind(def) {
            NodeKind::Func(f) => (f.vis, &f.args),
            NodeKind::ExternFunc(f) => (f.vis, &f.args),
            _ => return None,
        };
        Some(Self {
            vis,
            args: pretty_types(args.iter().map(|&a| ast.ty(a)), true),
            ret: ast.ty(def).clone(),
        })
    }

    /// Whether `implementation` satisfies this (member) signature. Return
    /// types may differ in declared sizes as long as they fit.
    fn accepts(&self, implementation: &Signature) -> bool {
        self.vis == implementation.vis
            && self.args == implementation.args
            && fits(&self.ret, &implementation.ret)
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) => {}",
            self.vis.as_str(),
            self.args,
            self.ret.pretty_for_machines()
        )
    }
}

/// Trait declarations the contract says it implements, with the
/// `implement` statement naming each.
fn implemented_traits(ast: &Ast) -> Vec<(NodeId, NodeId)> {
    ast.definitions()
        .iter()
        .filter_map(|&def| match ast.kind(def) {
            NodeKind::ImplTrait { expr } => match ast.ty(*expr) {
                Type::TraitDef(trait_def) => Some((def, *trait_def)),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn trait_parts(ast: &Ast, trait_def: NodeId) -> (String, Vec<NodeId>) {
    match ast.kind(trait_def) {
        NodeKind::TraitDef(t) => (t.id.clone(), t.members.clone()),
        _ => (String::new(), Vec::new()),
    }
}

fn duplicate(first: &str, second: &str, member: &str) -> Diagnostic {
    Diagnostic::error(
        Category::DuplicateTraitFunction,
        format!(
            "traits '{first}' and '{second}' implement the function '{member}' but have different arguments, return type or visibility"
        ),
    )
}

impl Infer<'_> {
    /// Match a freshly typed top-level function against the members of
    /// the implemented traits sharing its name.
    pub(crate) fn check_function_implements_trait(&mut self, func: NodeId) -> Result<(), Diagnostic> {
        let Some(name) = self.ast.func(func).and_then(|f| f.name.clone()) else {
            return Ok(());
        };
        let Some(signature) = Signature::of(self.ast, func) else {
            return Ok(());
        };

        let mut candidates = Vec::new();
        for (_, trait_def) in implemented_traits(self.ast) {
            let (trait_name, members) = trait_parts(self.ast, trait_def);
            for member in members {
                if self.ast.decl_name(member) != Some(name.as_str()) {
                    continue;
                }
                if let Some(expected) = Signature::of(self.ast, member) {
                    candidates.push((trait_name.clone(), trait_def, member, expected));
                }
            }
        }

        // Traits sharing a member name must agree on its signature.
        if let Some(((first_trait, .., first), rest)) = candidates.split_first() {
            for (other_trait, .., other) in rest {
                if !(first.accepts(other) && other.accepts(first)) {
                    return Err(duplicate(first_trait, other_trait, &name).at_line(self.ast.line(func)));
                }
            }
        }

        for (trait_name, trait_def, member, expected) in candidates {
            if !expected.accepts(&signature) {
                return Err(Diagnostic::error(
                    Category::TraitFunctionMismatch,
                    format!(
                        "function '{name}' has a different specification than the function defined by trait '{trait_name}'.\n\tThe function's is:\n\t\t'{signature}'\n\twhereas the trait expects\n\t\t'{expected}'"
                    ),
                )
                .at_line(self.ast.line(func)));
            }

            self.ast.add_comment(func, format!(";; part of trait '{trait_name}'"));
            if let NodeKind::ExternFunc(m) = self.ast.kind_mut(member) {
                m.implemented = true;
            }
            if let Some(def) = self.ast.func_mut(func) {
                def.trait_def = Some(trait_def);
            }
        }
        Ok(())
    }
}

/// After inference: implemented traits must agree on shared member
/// names, and every member must have an implementation.
pub fn validate_trait_implementations(ast: &Ast) -> Result<(), Diagnostic> {
    let implemented = implemented_traits(ast);

    let mut seen: BTreeMap<String, (String, Signature)> = BTreeMap::new();
    for &(stmt, trait_def) in &implemented {
        let (trait_name, members) = trait_parts(ast, trait_def);
        for member in members {
            let (Some(member_name), Some(signature)) = (ast.decl_name(member), Signature::of(ast, member)) else {
                continue;
            };
            if let Some((other, earlier)) = seen.get(member_name)
                && !(earlier.accepts(&signature) && signature.accepts(earlier))
            {
                return Err(duplicate(&trait_name, other, member_name).at_line(ast.line(stmt)));
            }
            seen.insert(member_name.to_string(), (trait_name.clone(), signature));
        }
    }

    for &(stmt, trait_def) in &implemented {
        let (trait_name, members) = trait_parts(ast, trait_def);
        let missing: Vec<&str> = members
            .iter()
            .filter(|&&m| matches!(ast.kind(m), NodeKind::ExternFunc(f) if !f.implemented))
            .filter_map(|&m| ast.decl_name(m))
            .collect();
        if !missing.is_empty() {
            return Err(Diagnostic::error(
                Category::TraitNotImplemented,
                format!(
                    "one or more trait functions of '{trait_name}' have not been implemented. implementations are needed for: {}",
                    missing.join(",")
                ),
            )
            .at_line(ast.line(stmt)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_ast::Visibility::*;

    use crate::typeck::{InferOptions, determine_types};
    use crate::validate_functions;

    /// `import` of a contract declaring trait `sip-010` with one member
    /// `get-name: public () => response<string-ascii[32],uint>`.
    fn with_trait(ast: &mut Ast, member_ret: Type) -> NodeId {
        let member = ast.extern_func(Public, "get-name", vec![], member_ret);
        let tr = ast.trait_def("sip-010", vec![member]);
        let cid = ast.principal("SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE");
        let ext = ast.declare_extern(Some("token"), Some(cid), vec![tr]);
        ast.push_definition(ext);
        let alias = ast.id("token");
        let target = ast.dot(Some(alias), "sip-010");
        let implement = ast.impl_trait(target);
        ast.push_definition(implement);
        member
    }

    fn get_name(ast: &mut Ast, vis: Visibility, text: &str) -> NodeId {
        let s = ast.ascii(text);
        let ok = ast.call("ok", vec![s]);
        let r = ast.ret(ok);
        let f = ast.function(vis, "get-name", vec![], vec![r]);
        ast.push_definition(f);
        f
    }

    fn run(ast: &mut Ast) -> Result<(), Diagnostic> {
        let order = validate_functions(ast)?;
        determine_types(ast, order, &InferOptions::default(), &mut Vec::new(), None)?;
        validate_trait_implementations(ast)
    }

    fn name_response() -> Type {
        Type::response(Some(Type::StringAscii(Some(32))), Some(Type::Uint))
    }

    #[test]
    fn matching_functions_implement_the_member() {
        let mut ast = Ast::new();
        let member = with_trait(&mut ast, name_response());
        let f = get_name(&mut ast, Public, "Token");
        run(&mut ast).unwrap();
        assert!(matches!(ast.kind(member), NodeKind::ExternFunc(m) if m.implemented));
        assert!(ast.func(f).unwrap().trait_def.is_some());
        assert!(ast[f].comments.contains(&";; part of trait 'sip-010'".to_string()));
    }

    #[test]
    fn visibility_must_match() {
        let mut ast = Ast::new();
        with_trait(&mut ast, name_response());
        get_name(&mut ast, ReadOnly, "Token");
        let err = run(&mut ast).unwrap_err();
        assert_eq!(err.category, Category::TraitFunctionMismatch);
        assert!(err.message.contains("whereas the trait expects\n\t\t'public () => response<string-ascii[32],uint>'"));
    }

    /// Implements `trait-a` and `trait-b`, both declaring `get-name`; only
    /// `trait-b`'s version takes an argument. `b_first` swaps the order of
    /// the two `implement` statements.
    fn with_conflicting_traits(ast: &mut Ast, b_first: bool) {
        let plain = ast.extern_func(Public, "get-name", vec![], name_response());
        let a = ast.trait_def("trait-a", vec![plain]);
        let amount = ast.arg("amount", Type::Uint);
        let with_arg = ast.extern_func(Public, "get-name", vec![amount], name_response());
        let b = ast.trait_def("trait-b", vec![with_arg]);
        let cid = ast.principal("SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE");
        let ext = ast.declare_extern(Some("token"), Some(cid), vec![a, b]);
        ast.push_definition(ext);

        let names = if b_first { ["trait-b", "trait-a"] } else { ["trait-a", "trait-b"] };
        for trait_name in names {
            let alias = ast.id("token");
            let target = ast.dot(Some(alias), trait_name);
            let implement = ast.impl_trait(target);
            ast.push_definition(implement);
        }
    }

    #[test]
    fn conflicting_members_are_duplicates_in_either_order() {
        for b_first in [false, true] {
            let mut ast = Ast::new();
            with_conflicting_traits(&mut ast, b_first);
            get_name(&mut ast, Public, "Token");
            let err = run(&mut ast).unwrap_err();
            assert_eq!(err.category, Category::DuplicateTraitFunction, "b_first = {b_first}");
            assert!(err.message.contains("'trait-a'"));
            assert!(err.message.contains("'trait-b'"));
        }
    }

    #[test]
    fn missing_members_are_reported() {
        let mut ast = Ast::new();
        with_trait(&mut ast, name_response());
        let err = run(&mut ast).unwrap_err();
        assert_eq!(err.category, Category::TraitNotImplemented);
        assert_eq!(
            err.message,
            "one or more trait functions of 'sip-010' have not been implemented. implementations are needed for: get-name"
        );
    }
}
