//! Literal coercions and optional unwrapping.
//!
//! Each helper rewrites nodes in place and is a no-op when it does not
//! apply, so callers invoke them speculatively before type comparisons.

use crystal_ast::{Ast, Ident, Lit, NodeId, NodeKind, UnaryOp};
use crystal_types::{MapType, Type};

const INT_MAX_EXCLUSIVE: u128 = 1 << 127;

/// Narrow an integer literal between int and uint, or turn a utf8 string
/// literal into a principal, when `to` asks for it. Returns whether the
/// node changed.
pub fn coerce_literal(ast: &mut Ast, node: NodeId, to: &Type) -> bool {
    let Some(lit) = ast.lit(node) else {
        return false;
    };
    let retyped = match (lit, ast.ty(node), to) {
        (Lit::Int(v), Type::Int, Type::Uint) if *v >= 0 => {
            Some((NodeKind::Lit(Lit::Uint(*v as u128)), Type::Uint))
        }
        (Lit::Uint(v), Type::Uint, Type::Int) if *v < INT_MAX_EXCLUSIVE => {
            Some((NodeKind::Lit(Lit::Int(*v as i128)), Type::Int))
        }
        (Lit::Str(text), Type::String(_), Type::Principal) => {
            Some((NodeKind::Lit(Lit::Str(text.clone())), Type::Principal))
        }
        _ => None,
    };
    match retyped {
        Some((kind, ty)) => {
            ast.reset(node, kind, ty);
            true
        }
        None => false,
    }
}

/// Wrap a bare value in `optional(..)`.
pub fn coerce_to_optional(ast: &mut Ast, node: NodeId) -> bool {
    if ast.ty(node).is_optional() {
        return false;
    }
    let item = ast.ty(node).clone();
    ast.wrap(node, Type::optional(item), |a| NodeKind::Unary {
        op: UnaryOp::Some,
        a,
    });
    true
}

/// Build a call to a builtin by name.
pub fn builtin_call(ast: &mut Ast, name: &str, args: Vec<NodeId>) -> NodeKind {
    let callee = ast.alloc_typed(
        NodeKind::Id(Ident {
            name: name.to_string(),
            decl: None,
            bind: Vec::new(),
        }),
        Type::Builtin(name.to_string()),
    );
    NodeKind::Call { callee, args }
}

enum Unwrap {
    Panic,
    DefaultTo,
}

fn unwrap_with(ast: &mut Ast, node: NodeId, how: Unwrap) {
    let ty = ast.ty(node).clone();
    if !ty.is_optional() || ty.is_none() {
        return;
    }
    let item = ty.item_type().unwrap_or(Type::Runtime);
    if let (Unwrap::Panic, NodeKind::Unary { op: UnaryOp::Some, a }) = (&how, ast.kind(node)) {
        let a = *a;
        ast.raise_child(node, a);
        return;
    }
    let inner = ast.detach(node);
    let (name, args) = match how {
        Unwrap::Panic => ("unwrap-panic", vec![inner]),
        Unwrap::DefaultTo => {
            let none = ast.keyword("none", Type::None);
            ("default-to", vec![none, inner])
        }
    };
    let kind = builtin_call(ast, name, args);
    ast.reset(node, kind, item);
}

/// Replace an optional value by `unwrap-panic(value)`. `none` is left
/// alone and `optional(x)` simplifies to `x`.
pub fn unwrap_optional(ast: &mut Ast, node: NodeId) {
    unwrap_with(ast, node, Unwrap::Panic);
}

/// Replace an optional value by `default-to(none, value)`.
pub fn unwrap_optional_with_default_to(ast: &mut Ast, node: NodeId) {
    unwrap_with(ast, node, Unwrap::DefaultTo);
}

/// Make an optional usable as a condition: `none` becomes `false` and any
/// other optional becomes `is-some(x)`.
pub fn truthy(ast: &mut Ast, node: NodeId) {
    let ty = ast.ty(node);
    if !ty.is_optional() {
        return;
    }
    if ty.is_none() {
        ast.reset(node, NodeKind::Lit(Lit::Bool(false)), Type::Bool);
        return;
    }
    let inner = ast.detach(node);
    let kind = builtin_call(ast, "is-some", vec![inner]);
    ast.reset(node, kind, Type::Bool);
}

/// Before a call, adjust the literal arguments to the declared argument
/// types and wrap bare values passed for optional arguments.
pub fn coerce_call_args(ast: &mut Ast, def_args: &[Type], call_args: &[NodeId]) {
    if def_args.len() != call_args.len() {
        return;
    }
    for (def, &arg) in def_args.iter().zip(call_args) {
        coerce_literal(ast, arg, def);
        if def.is_optional() && !ast.ty(arg).is_optional() {
            coerce_to_optional(ast, arg);
        }
    }
}

/// Fit the fields of a map literal to a map type: unwrap optionals the
/// type does not want, wrap values it wants optional, and narrow integer
/// literals. The literal's own type follows.
pub fn coerce_lit_map_values(ast: &mut Ast, mapdef: &Type, node: NodeId) {
    let Some(Lit::Map(_)) = ast.lit(node) else {
        return;
    };
    let Some(def_fields) = mapdef.map_fields().cloned() else {
        return;
    };
    coerce_map_fields(ast, &def_fields, node);
}

fn coerce_map_fields(ast: &mut Ast, def: &indexmap::IndexMap<String, Type>, node: NodeId) {
    let Some(Lit::Map(fields)) = ast.lit(node).cloned() else {
        return;
    };
    for (key, &val) in &fields {
        let Some(want) = def.get(key) else {
            continue;
        };
        if let Some(nested) = want.map_fields()
            && ast.ty(val).map_fields().is_some()
        {
            coerce_map_fields(ast, nested, val);
        } else {
            let have_optional = ast.ty(val).is_optional();
            let want_optional = want.is_optional();
            if have_optional && !want_optional {
                unwrap_optional(ast, val);
                coerce_literal(ast, val, want);
            } else if !have_optional && want_optional {
                coerce_to_optional(ast, val);
            } else {
                coerce_literal(ast, val, want);
            }
        }
        let field_ty = ast.ty(val).clone();
        if let Type::Map(MapType::Fields(types)) = &mut ast[node].ty {
            types.insert(key.clone(), field_ty);
        }
    }
}
