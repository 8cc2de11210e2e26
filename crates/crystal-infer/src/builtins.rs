//! Builtin operations: their signatures and how a call's type follows
//! from the matched signature.
//!
//! Operators are builtins too, so they can be passed where a function is
//! expected (`map(+, a, b)`).

use crystal_ast::{Lit, NodeId, NodeKind};
use crystal_diag::{Category, Diagnostic};
use crystal_types::{Type, equal, equal_strict, sizes::MAX_VALUE_SIZE};

use crate::abi::{AbiArg, AbiEntry, resolve};
use crate::coerce::{coerce_lit_map_values, unwrap_optional};
use crate::typeck::Infer;

/// A resolved call to a builtin, handed to its typing hook.
pub(crate) struct CallSite<'s> {
    pub node: NodeId,
    pub args: Vec<NodeId>,
    pub entry: &'s AbiEntry,
    /// Index of the matched signature.
    pub index: usize,
    pub scopes: &'s [NodeId],
}

pub(crate) type FillFn = fn(&mut Infer<'_>, &CallSite<'_>) -> Result<(), Diagnostic>;

#[derive(Clone, Copy)]
pub(crate) enum Fill {
    /// The matched signature's return type.
    Ret,
    /// The type of the first argument.
    FirstArg,
    Custom(FillFn),
}

pub struct Builtin {
    pub name: &'static str,
    abi: fn() -> Vec<AbiEntry>,
    pub(crate) fill: Fill,
    /// Argument whose value a failing call returns from the function.
    pub thrown_arg: Option<usize>,
    /// Only reachable through property access, never by name.
    pub internal: bool,
}

impl Builtin {
    pub fn abi(&self) -> Vec<AbiEntry> {
        (self.abi)()
    }
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

/// Look up a builtin callable by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name && !b.internal)
}

/// Look up a builtin, internal ones included.
pub fn by_name(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

fn ty(t: Type) -> AbiArg {
    AbiArg::Ty(t)
}

fn buff(size: u128) -> Type {
    Type::Buff(Some(size))
}

fn resp(ok: Type, err: Type) -> Type {
    Type::response(Some(ok), Some(err))
}

fn bool_or_uint_err() -> Type {
    resp(Type::Bool, Type::Uint)
}

fn nft() -> Type {
    Type::Nft(Box::new(Type::Any))
}

fn int_variadic() -> Vec<AbiEntry> {
    vec![
        AbiEntry::new(vec![ty(Type::Int), AbiArg::Repeat], Type::Int),
        AbiEntry::new(vec![ty(Type::Uint), AbiArg::Repeat], Type::Uint),
    ]
}

fn int_unary() -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::Int], Type::Int),
        AbiEntry::of([Type::Uint], Type::Uint),
    ]
}

fn int_pair() -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::Int, Type::Int], Type::Int),
        AbiEntry::of([Type::Uint, Type::Uint], Type::Uint),
    ]
}

fn int_shift() -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::Int, Type::Uint], Type::Int),
        AbiEntry::of([Type::Uint, Type::Uint], Type::Uint),
    ]
}

fn int_compare() -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::Int, Type::Int], Type::Bool),
        AbiEntry::of([Type::Uint, Type::Uint], Type::Bool),
    ]
}

fn any_variadic_bool() -> Vec<AbiEntry> {
    vec![AbiEntry::new(vec![ty(Type::Any), AbiArg::Repeat], Type::Bool)]
}

fn bool_variadic() -> Vec<AbiEntry> {
    vec![AbiEntry::new(vec![ty(Type::Bool), AbiArg::Repeat], Type::Bool)]
}

fn bool_unary() -> Vec<AbiEntry> {
    vec![AbiEntry::of([Type::Bool], Type::Bool)]
}

fn any_to_any() -> Vec<AbiEntry> {
    vec![AbiEntry::of([Type::Any], Type::Any)]
}

fn any_to_response() -> Vec<AbiEntry> {
    vec![AbiEntry::of([Type::Any], Type::any_response())]
}

fn hashing(size: u128) -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::Buff(None)], buff(size)),
        AbiEntry::new(vec![AbiArg::OneOf(vec![Type::Uint, Type::Int])], buff(size)),
    ]
}

fn block_info() -> Vec<AbiEntry> {
    vec![AbiEntry::new(
        vec![
            AbiArg::OneOf(vec![Type::String(None), Type::StringAscii(None)]),
            ty(Type::Uint),
        ],
        Type::optional_of_any(),
    )]
}

fn unwrap_with_thrown() -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::optional_of_any(), Type::Any], Type::Any),
        AbiEntry::of([Type::any_response(), Type::Any], Type::Any),
    ]
}

fn unwrap_any() -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::optional_of_any()], Type::Any),
        AbiEntry::of([Type::any_response()], Type::Any),
    ]
}

fn string_to_number(to: Type) -> Vec<AbiEntry> {
    vec![
        AbiEntry::of([Type::StringAscii(Some(1_048_576))], Type::optional(to.clone())),
        AbiEntry::of([Type::String(Some(262_144))], Type::optional(to)),
    ]
}

fn principal_parts() -> Type {
    Type::map([
        ("hash-bytes", buff(20)),
        ("name", Type::optional(Type::StringAscii(Some(40)))),
        ("version", buff(1)),
    ])
}

fn principal_construct_err() -> Type {
    Type::map([
        ("error_code", Type::Uint),
        ("value", Type::optional(Type::Principal)),
    ])
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

macro_rules! builtin {
    ($name:literal, $abi:expr, $fill:expr) => {
        builtin!($name, $abi, $fill, None)
    };
    ($name:literal, $abi:expr, $fill:expr, $thrown:expr) => {
        Builtin {
            name: $name,
            abi: $abi,
            fill: $fill,
            thrown_arg: $thrown,
            internal: false,
        }
    };
}

static BUILTINS: &[Builtin] = &[
    // operators
    builtin!("+", int_variadic, Fill::Ret),
    builtin!("-", int_variadic, Fill::Ret),
    builtin!("*", int_variadic, Fill::Ret),
    builtin!("/", int_variadic, Fill::Ret),
    builtin!("%", int_pair, Fill::Ret),
    builtin!("**", int_pair, Fill::Ret),
    builtin!("^", int_variadic, Fill::Ret),
    builtin!("~", int_unary, Fill::Ret),
    builtin!("&", int_variadic, Fill::Ret),
    builtin!("|", int_variadic, Fill::Ret),
    builtin!("<<", int_shift, Fill::Ret),
    builtin!(">>", int_shift, Fill::Ret),
    builtin!(">=", int_compare, Fill::Ret),
    builtin!("<=", int_compare, Fill::Ret),
    builtin!(">", int_compare, Fill::Ret),
    builtin!("<", int_compare, Fill::Ret),
    builtin!("==", any_variadic_bool, Fill::Ret),
    builtin!("&&", bool_variadic, Fill::Ret),
    builtin!("||", bool_variadic, Fill::Ret),
    builtin!("!", bool_unary, Fill::Ret),
    // responses
    builtin!("ok", any_to_response, Fill::Custom(fill_ok)),
    builtin!("err", any_to_response, Fill::Custom(fill_err)),
    // math
    builtin!("sqrti", int_unary, Fill::FirstArg),
    builtin!("log2", int_unary, Fill::FirstArg),
    // sequences
    builtin!(
        "map",
        || vec![AbiEntry::new(
            vec![AbiArg::Callable, ty(Type::Seq), AbiArg::Repeat],
            Type::list_of_any()
        )],
        Fill::Custom(fill_map)
    ),
    builtin!(
        "fold",
        || vec![AbiEntry::new(
            vec![AbiArg::Callable, ty(Type::Seq), ty(Type::Any)],
            Type::Any
        )],
        Fill::Custom(fill_fold)
    ),
    builtin!(
        "filter",
        || vec![AbiEntry::new(vec![AbiArg::Callable, ty(Type::Seq)], Type::Seq)],
        Fill::Custom(fill_filter)
    ),
    builtin!(
        "append",
        || vec![AbiEntry::of([Type::list_of_any(), Type::Any], Type::list_of_any())],
        Fill::Custom(fill_append)
    ),
    builtin!(
        "concat",
        || vec![AbiEntry::of([Type::Seq, Type::Seq], Type::Seq)],
        Fill::Custom(fill_concat)
    ),
    builtin!(
        "as-max-len?",
        || vec![AbiEntry::of([Type::Seq, Type::Uint], Type::optional(Type::Seq))],
        Fill::Custom(fill_as_max_len)
    ),
    builtin!(
        "len",
        || vec![AbiEntry::of([Type::Seq], Type::Uint)],
        Fill::Ret
    ),
    builtin!(
        "index-of?",
        || vec![AbiEntry::of([Type::Seq, Type::Any], Type::optional(Type::Uint))],
        Fill::Custom(fill_index_of)
    ),
    builtin!(
        "merge",
        || vec![AbiEntry::of([Type::any_map(), Type::any_map()], Type::any_map())],
        Fill::Custom(fill_merge)
    ),
    builtin!(
        "replace-at?",
        || vec![AbiEntry::of([Type::Seq, Type::Uint, Type::Any], Type::optional_of_any())],
        Fill::Custom(fill_optional_of_first)
    ),
    builtin!(
        "slice?",
        || vec![AbiEntry::of([Type::Seq, Type::Uint, Type::Uint], Type::optional_of_any())],
        Fill::Custom(fill_optional_of_first)
    ),
    // hashing and signatures
    builtin!("hash160", || hashing(20), Fill::Ret),
    builtin!("sha256", || hashing(32), Fill::Ret),
    builtin!("sha512", || hashing(64), Fill::Ret),
    builtin!("sha512-256", || hashing(32), Fill::Ret),
    builtin!("keccak256", || hashing(32), Fill::Ret),
    builtin!(
        "secp256k1-recover?",
        || vec![AbiEntry::of([buff(32), buff(65)], resp(buff(33), Type::Uint))],
        Fill::Ret
    ),
    builtin!(
        "secp256k1-verify",
        || vec![
            AbiEntry::of([buff(32), buff(64), buff(33)], Type::Bool),
            AbiEntry::of([buff(32), buff(65), buff(33)], Type::Bool),
        ],
        Fill::Ret
    ),
    // contract context
    builtin!("print", any_to_any, Fill::FirstArg),
    builtin!(
        "contract-call?",
        || vec![AbiEntry::new(
            vec![AbiArg::Callable, AbiArg::Repeat, ty(Type::Any)],
            Type::any_response()
        )],
        Fill::Custom(fill_contract_call)
    ),
    builtin!("as-contract", any_to_any, Fill::FirstArg),
    builtin!(
        "contract-of",
        || vec![AbiEntry::of([Type::trait_of_any()], Type::Principal)],
        Fill::Custom(fill_contract_of)
    ),
    builtin!(
        "principal-of?",
        || vec![AbiEntry::of([buff(33)], resp(Type::Principal, Type::Uint))],
        Fill::Ret
    ),
    builtin!(
        "at-block",
        || vec![AbiEntry::of([buff(32), Type::Any], Type::Any)],
        Fill::Custom(fill_at_block)
    ),
    builtin!("get-block-info?", block_info, Fill::Custom(fill_block_info)),
    builtin!("get-burn-block-info?", block_info, Fill::Custom(fill_burn_block_info)),
    // optionals and responses
    builtin!(
        "default-to",
        || vec![AbiEntry::of([Type::NonOptional, Type::optional_of_any()], Type::NonOptional)],
        Fill::Custom(fill_default_to)
    ),
    builtin!(
        "asserts!",
        || vec![AbiEntry::of([Type::Bool, Type::Any], Type::Bool)],
        Fill::Ret,
        Some(1)
    ),
    builtin!("unwrap!", unwrap_with_thrown, Fill::Custom(fill_unwrap), Some(1)),
    builtin!(
        "unwrap-err!",
        || vec![AbiEntry::of([Type::any_response(), Type::Any], Type::Any)],
        Fill::Custom(fill_unwrap_err),
        Some(1)
    ),
    builtin!("unwrap-panic", unwrap_any, Fill::Custom(fill_unwrap)),
    builtin!(
        "unwrap-err-panic",
        || vec![AbiEntry::of([Type::any_response()], Type::Any)],
        Fill::Custom(fill_unwrap_err)
    ),
    builtin!("try!", unwrap_any, Fill::Custom(fill_unwrap), Some(0)),
    builtin!(
        "is-ok",
        || vec![AbiEntry::of([Type::any_response()], Type::Bool)],
        Fill::Custom(fill_is_ok)
    ),
    builtin!(
        "is-err",
        || vec![AbiEntry::of([Type::any_response()], Type::Bool)],
        Fill::Custom(fill_is_err)
    ),
    builtin!(
        "is-none",
        || vec![AbiEntry::of([Type::optional_of_any()], Type::Bool)],
        Fill::Ret
    ),
    builtin!(
        "is-some",
        || vec![AbiEntry::of([Type::optional_of_any()], Type::Bool)],
        Fill::Ret
    ),
    // tokens
    builtin!(
        "ft-get-balance",
        || vec![AbiEntry::of([Type::Ft, Type::Principal], Type::Uint)],
        Fill::Ret
    ),
    builtin!(
        "ft-get-supply",
        || vec![AbiEntry::of([Type::Ft], Type::Uint)],
        Fill::Ret
    ),
    builtin!(
        "ft-transfer?",
        || vec![AbiEntry::of(
            [Type::Ft, Type::Uint, Type::Principal, Type::Principal],
            bool_or_uint_err()
        )],
        Fill::Ret
    ),
    builtin!(
        "ft-mint?",
        || vec![AbiEntry::of([Type::Ft, Type::Uint, Type::Principal], bool_or_uint_err())],
        Fill::Ret
    ),
    builtin!(
        "ft-burn?",
        || vec![AbiEntry::of([Type::Ft, Type::Uint, Type::Principal], bool_or_uint_err())],
        Fill::Ret
    ),
    builtin!(
        "nft-get-owner?",
        || vec![AbiEntry::of([nft(), Type::NonOptional], Type::optional(Type::Principal))],
        Fill::Custom(fill_nft)
    ),
    builtin!(
        "nft-transfer?",
        || vec![AbiEntry::of(
            [nft(), Type::NonOptional, Type::Principal, Type::Principal],
            bool_or_uint_err()
        )],
        Fill::Custom(fill_nft)
    ),
    builtin!(
        "nft-mint?",
        || vec![AbiEntry::of([nft(), Type::NonOptional, Type::Principal], bool_or_uint_err())],
        Fill::Custom(fill_nft)
    ),
    builtin!(
        "nft-burn?",
        || vec![AbiEntry::of([nft(), Type::NonOptional, Type::Principal], bool_or_uint_err())],
        Fill::Custom(fill_nft)
    ),
    // stx
    builtin!(
        "stx-account",
        || vec![AbiEntry::of(
            [Type::Principal],
            Type::map([
                ("locked", Type::Uint),
                ("unlock-height", Type::Uint),
                ("unlocked", Type::Uint),
            ])
        )],
        Fill::Ret
    ),
    builtin!(
        "stx-get-balance",
        || vec![AbiEntry::of([Type::Principal], Type::Uint)],
        Fill::Ret
    ),
    builtin!(
        "stx-transfer?",
        || vec![AbiEntry::of([Type::Uint, Type::Principal, Type::Principal], bool_or_uint_err())],
        Fill::Ret
    ),
    builtin!(
        "stx-transfer-memo?",
        || vec![AbiEntry::of(
            [Type::Uint, Type::Principal, Type::Principal, Type::Buff(None)],
            bool_or_uint_err()
        )],
        Fill::Ret
    ),
    builtin!(
        "stx-burn?",
        || vec![AbiEntry::of([Type::Uint, Type::Principal], bool_or_uint_err())],
        Fill::Ret
    ),
    // conversions
    builtin!(
        "buff-to-int-be",
        || vec![AbiEntry::of([buff(16)], Type::Int)],
        Fill::Ret
    ),
    builtin!(
        "buff-to-int-le",
        || vec![AbiEntry::of([buff(16)], Type::Int)],
        Fill::Ret
    ),
    builtin!(
        "buff-to-uint-be",
        || vec![AbiEntry::of([buff(16)], Type::Uint)],
        Fill::Ret
    ),
    builtin!(
        "buff-to-uint-le",
        || vec![AbiEntry::of([buff(16)], Type::Uint)],
        Fill::Ret
    ),
    builtin!(
        "to-consensus-buff?",
        || vec![AbiEntry::of(
            [Type::Any],
            Type::optional(Type::Buff(Some(MAX_VALUE_SIZE - 8)))
        )],
        Fill::Ret
    ),
    builtin!(
        "from-consensus-buff?",
        || vec![AbiEntry::of(
            [Type::Typedef(Box::new(Type::Any)), Type::Buff(None)],
            Type::optional_of_any()
        )],
        Fill::Custom(fill_from_consensus_buff)
    ),
    builtin!(
        "int-to-ascii",
        || vec![AbiEntry::new(
            vec![AbiArg::OneOf(vec![Type::Int, Type::Uint])],
            Type::StringAscii(Some(40))
        )],
        Fill::Ret
    ),
    builtin!(
        "int-to-utf8",
        || vec![AbiEntry::new(
            vec![AbiArg::OneOf(vec![Type::Int, Type::Uint])],
            Type::String(Some(40))
        )],
        Fill::Ret
    ),
    builtin!("string-to-int?", || string_to_number(Type::Int), Fill::Ret),
    builtin!("string-to-uint?", || string_to_number(Type::Uint), Fill::Ret),
    // principals
    builtin!(
        "is-standard",
        || vec![AbiEntry::of([Type::Principal], Type::Bool)],
        Fill::Ret
    ),
    builtin!(
        "principal-construct?",
        || vec![
            AbiEntry::of([buff(1), buff(20)], resp(Type::Principal, principal_construct_err())),
            AbiEntry::of(
                [buff(1), buff(20), Type::StringAscii(Some(40))],
                resp(Type::Principal, principal_construct_err())
            ),
        ],
        Fill::Ret
    ),
    builtin!(
        "principal-destruct?",
        || vec![AbiEntry::of([Type::Principal], resp(principal_parts(), principal_parts()))],
        Fill::Ret
    ),
    Builtin {
        name: "_utf8-to-ascii",
        abi: || vec![AbiEntry::of([Type::String(None)], Type::StringAscii(None))],
        fill: Fill::Custom(fill_utf8_to_ascii),
        thrown_arg: None,
        internal: true,
    },
];

// ---------------------------------------------------------------------------
// Typing hooks
// ---------------------------------------------------------------------------

fn arg_ty(infer: &Infer<'_>, site: &CallSite<'_>, idx: usize) -> Type {
    site.args
        .get(idx)
        .map(|&a| infer.ast.ty(a).clone())
        .unwrap_or_default()
}

fn wrap_response(infer: &mut Infer<'_>, site: &CallSite<'_>, which: &str) -> Result<(), Diagnostic> {
    let value = arg_ty(infer, site, 0);
    if value.is_response() {
        infer.warn(
            site.node,
            format!("{which}() called on a value that is already a 'response' type"),
        );
    }
    let ty = if which == "ok" {
        Type::response(Some(value), None)
    } else {
        Type::response(None, Some(value))
    };
    infer.ast.set_ty(site.node, ty);
    Ok(())
}

fn fill_ok(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    wrap_response(infer, site, "ok")
}

fn fill_err(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    wrap_response(infer, site, "err")
}

fn undetermined_return(name: &str) -> Diagnostic {
    Diagnostic::error(
        Category::UndeterminedType,
        format!("the return type of function '{name}' is undetermined"),
    )
}

/// Resolve the function argument of a higher-order builtin against the
/// item types it will be called with. Returns its return type.
fn apply_callable(
    infer: &Infer<'_>,
    site: &CallSite<'_>,
    role: &str,
    args: &[Type],
) -> Result<(String, Type), Diagnostic> {
    let callable = infer.callable(&arg_ty(infer, site, 0))?;
    if callable.uses_closure {
        return Err(Diagnostic::error(
            Category::NotSupported,
            format!(
                "{role} function '{}' uses closure, which is not suppored",
                callable.name
            ),
        ));
    }
    let matched = resolve(&callable.name, &callable.entries, args, false)?;
    if callable.user && matched.entry.ret.is_undetermined() {
        return Err(undetermined_return(&callable.name));
    }
    Ok((callable.name, matched.entry.ret.clone()))
}

fn fill_map(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let mut item_types = Vec::new();
    for idx in 1..site.args.len() {
        let Some(item) = arg_ty(infer, site, idx).item_type() else {
            return Err(Diagnostic::error(
                Category::UndeterminedType,
                format!("the type of argument {} is undetermined", idx + 1),
            ));
        };
        item_types.push(item);
    }
    let (_, ret) = apply_callable(infer, site, "mapping", &item_types)?;
    let size = arg_ty(infer, site, 1).size();
    infer.ast.set_ty(site.node, Type::list(ret, size));
    Ok(())
}

fn fill_fold(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let item = arg_ty(infer, site, 1).item_type().unwrap_or_default();
    if !item.is_optional() {
        unwrap_optional(infer.ast, site.args[2]);
    }
    let initial = arg_ty(infer, site, 2);
    let (name, ret) = apply_callable(infer, site, "folding", &[item, initial.clone()])?;
    if !equal(&ret, &initial) {
        return Err(Diagnostic::error(
            Category::TypeMismatch,
            format!(
                "the function '{name}' in argument 1 returns '{ret}' but must return the same type as argument 3 ('{initial}')"
            ),
        ));
    }
    infer.ast.set_ty(site.node, ret);
    Ok(())
}

fn fill_filter(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let item = arg_ty(infer, site, 1).item_type().unwrap_or_default();
    let (name, ret) = apply_callable(infer, site, "filter", &[item])?;
    if !equal(&ret, &Type::Bool) {
        return Err(Diagnostic::error(
            Category::TypeMismatch,
            format!("the 'filter' function '{name}' returns '{ret}', but is required to return 'bool'"),
        ));
    }
    let list = arg_ty(infer, site, 1);
    infer.ast.set_ty(site.node, list);
    Ok(())
}

fn fill_append(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let list = arg_ty(infer, site, 0);
    let item = list.item_type().unwrap_or_default();
    if !item.is_optional() {
        unwrap_optional(infer.ast, site.args[1]);
    }
    infer.ensure_equal(
        &item,
        &arg_ty(infer, site, 1),
        Some("append item and list elements have different types"),
    )?;
    let mut ty = list;
    let size = ty.size().map(|s| s + 1);
    ty.set_size(size);
    infer.ast.set_ty(site.node, ty);
    Ok(())
}

fn fill_concat(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let a = arg_ty(infer, site, 0);
    let b = arg_ty(infer, site, 1);
    infer.ensure_equal(
        &a.item_type().unwrap_or_default(),
        &b.item_type().unwrap_or_default(),
        Some("both sequences must have the same element type"),
    )?;
    let size = match (a.size(), b.size()) {
        (Some(x), Some(y)) => Some(x + y),
        _ => None,
    };
    let mut ty = a;
    ty.set_size(size);
    infer.ast.set_ty(site.node, ty);
    Ok(())
}

fn fill_as_max_len(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let len = match infer.ast.lit(site.args[1]) {
        Some(Lit::Uint(v)) => *v,
        Some(Lit::Int(v)) if *v >= 0 => *v as u128,
        _ => {
            return Err(Diagnostic::error(
                Category::Syntax,
                "clarity's as-max-len? only accepts a literal length argument, expressions are not allowed",
            ));
        }
    };
    let mut seq = arg_ty(infer, site, 0);
    seq.set_size(Some(len));
    infer.ast.set_ty(site.node, Type::optional(seq));
    Ok(())
}

fn fill_index_of(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let item = arg_ty(infer, site, 0).item_type().unwrap_or_default();
    let needle = site.args[1];
    if infer.ast.ty(needle).is(&Type::any_map()) && item.is(&Type::any_map()) {
        coerce_lit_map_values(infer.ast, &item, needle);
    } else if !item.is_optional() {
        unwrap_optional(infer.ast, needle);
    }
    let found = infer.ast.ty(needle).clone();
    if !equal_strict(&item, &found)? {
        return Err(Diagnostic::error(
            Category::TypeMismatch,
            format!("the sequence's element type '{item}' does not match the item to find '{found}'"),
        ));
    }
    infer.ast.set_ty(site.node, site.entry.ret.clone());
    Ok(())
}

fn fill_merge(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let mut merged = arg_ty(infer, site, 0);
    let other = arg_ty(infer, site, 1);
    if let (Type::Map(crystal_types::MapType::Fields(fields)), Some(overrides)) =
        (&mut merged, other.map_fields())
    {
        for (key, ty) in overrides {
            fields.insert(key.clone(), ty.clone());
        }
    }
    infer.ast.set_ty(site.node, merged);
    Ok(())
}

fn fill_optional_of_first(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let seq = arg_ty(infer, site, 0);
    infer.ast.set_ty(site.node, Type::optional(seq));
    Ok(())
}

fn fill_contract_call(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let callee = site.args[0];
    let Type::Func(fref) = infer.ast.ty(callee).clone() else {
        return Err(only_contract_calls());
    };
    let NodeKind::ExternFunc(ext) = infer.ast.kind(fref.def).clone() else {
        return Err(only_contract_calls());
    };
    infer.ensure_no_readonly_violation(fref.def, site.scopes)?;

    let entries = vec![infer.signature_of(fref.def)];
    let rest: Vec<Type> = site.args[1..]
        .iter()
        .map(|&a| infer.ast.ty(a).clone())
        .collect();
    let matched = resolve(&ext.name, &entries, &rest, true)?;
    for idx in matched.unwrap.clone() {
        unwrap_optional(infer.ast, site.args[idx + 1]);
    }

    // The called contract and the function name lead the arguments.
    let contract = match fref.implementor {
        Some(implementor) => implementor,
        None => {
            let cid = ext
                .contract_id
                .and_then(|c| infer.ast.lit_text(c).map(str::to_string))
                .ok_or_else(|| Diagnostic::internal(format!("extern function '{}' has no contract", ext.name)))?;
            infer.ast.principal(&cid)
        }
    };
    let name = infer.ast.keyword(&ext.name, Type::String(None));
    if let NodeKind::Call { args, .. } = infer.ast.kind_mut(site.node) {
        args.splice(0..1, [contract, name]);
    }
    let ret = infer.ast.ty(fref.def).clone();
    infer.ast.set_ty(site.node, ret);
    Ok(())
}

fn only_contract_calls() -> Diagnostic {
    Diagnostic::error(
        Category::Argument,
        "only calls to other contracts may be made with contract-call",
    )
}

fn fill_contract_of(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    if infer.ast.ident(site.args[0]).is_none() {
        return Err(Diagnostic::error(
            Category::TypeMismatch,
            "the argument to 'contract-of' must be the name of a trait (from 'use-trait')",
        ));
    }
    infer.ast.set_ty(site.node, Type::Principal);
    Ok(())
}

fn fill_at_block(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let ty = arg_ty(infer, site, 1);
    infer.ast.set_ty(site.node, ty);
    Ok(())
}

const BLOCK_INFO_PROPERTIES: &[&str] = &[
    "time",
    "header-hash",
    "burnchain-header-hash",
    "id-header-hash",
    "miner-address",
    "vrf-seed",
    "block-reward",
    "miner-spend-total",
    "miner-spend-winner",
];

fn block_info_property(name: &str) -> Option<Type> {
    match name {
        "time" | "block-reward" | "miner-spend-total" | "miner-spend-winner" => Some(Type::Uint),
        "header-hash" | "burnchain-header-hash" | "id-header-hash" | "vrf-seed" => Some(buff(32)),
        "miner-address" => Some(Type::Principal),
        _ => None,
    }
}

const BURN_BLOCK_INFO_PROPERTIES: &[&str] = &["header-hash", "pox-addrs"];

fn burn_block_info_property(name: &str) -> Option<Type> {
    match name {
        "header-hash" => Some(buff(32)),
        "pox-addrs" => Some(Type::map([
            (
                "addrs",
                Type::list(
                    Type::map([("hashbytes", buff(32)), ("version", buff(1))]),
                    Some(2),
                ),
            ),
            ("payout", Type::Uint),
        ])),
        _ => None,
    }
}

fn property_lookup(
    infer: &mut Infer<'_>,
    site: &CallSite<'_>,
    builtin: &str,
    valid: &[&str],
    lookup: fn(&str) -> Option<Type>,
) -> Result<(), Diagnostic> {
    let prop = site.args[0];
    let Some(Lit::Str(name)) = infer.ast.lit(prop).cloned() else {
        return Err(Diagnostic::error(
            Category::Syntax,
            format!("the first argument to '{builtin}' must be a literal string"),
        ));
    };
    let Some(item) = lookup(&name) else {
        return Err(Diagnostic::error(
            Category::Syntax,
            format!(
                "'{name}' is not a valid property name. Available property names are: {}",
                valid.join(", ")
            ),
        ));
    };
    // Emitted unquoted.
    let prop_ty = infer.ast.ty(prop).clone();
    infer.ast.reset(prop, NodeKind::Lit(Lit::Keyword(name)), prop_ty);
    infer.ast.set_ty(site.node, Type::optional(item));
    Ok(())
}

fn fill_block_info(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    property_lookup(infer, site, "get-block-info?", BLOCK_INFO_PROPERTIES, block_info_property)
}

fn fill_burn_block_info(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    property_lookup(
        infer,
        site,
        "get-burn-block-info?",
        BURN_BLOCK_INFO_PROPERTIES,
        burn_block_info_property,
    )
}

fn fill_default_to(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let default = arg_ty(infer, site, 0);
    let value = arg_ty(infer, site, 1);
    if value.is_none() {
        infer.ast.set_ty(site.node, default);
        return Ok(());
    }
    let item = value.item_type().unwrap_or_default();
    if !equal(&default, &item) {
        return Err(Diagnostic::error(
            Category::TypeMismatch,
            format!("the default value type '{default}' does not match the option value type '{item}'"),
        ));
    }
    infer.ast.set_ty(site.node, item);
    Ok(())
}

fn builtin_name(infer: &Infer<'_>, site: &CallSite<'_>) -> String {
    match infer.ast.kind(site.node) {
        NodeKind::Call { callee, .. } => infer
            .ast
            .ident(*callee)
            .map(|i| i.name.trim_end_matches('!').to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn fill_unwrap(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let value = arg_ty(infer, site, 0);
    let ty = if site.index == 0 {
        value.item_type().unwrap_or(Type::Runtime)
    } else if let Some(ok) = value.ok_type() {
        ok.clone()
    } else {
        return Err(Diagnostic::error(
            Category::UndeterminedType,
            format!(
                "the type of the first argument to {} is undetermined because there is no ok type associated with the response type '{value}'",
                builtin_name(infer, site)
            ),
        ));
    };
    infer.ast.set_ty(site.node, ty);
    Ok(())
}

fn fill_unwrap_err(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let value = arg_ty(infer, site, 0);
    let Some(err) = value.err_type().cloned() else {
        return Err(Diagnostic::error(
            Category::UndeterminedType,
            format!(
                "the type of the first argument to {} is undetermined because there is no err type associated with the response type '{value}'",
                builtin_name(infer, site)
            ),
        ));
    };
    infer.ast.set_ty(site.node, err);
    Ok(())
}

/// `is-ok`/`is-err` on a response that can never be ok/err is `false`.
fn test_response_part(infer: &mut Infer<'_>, site: &CallSite<'_>, has_part: bool) {
    if has_part {
        infer.ast.set_ty(site.node, Type::Bool);
    } else {
        infer
            .ast
            .reset(site.node, NodeKind::Lit(Lit::Bool(false)), Type::Bool);
    }
}

fn fill_is_ok(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let has_ok = arg_ty(infer, site, 0).ok_type().is_some();
    test_response_part(infer, site, has_ok);
    Ok(())
}

fn fill_is_err(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let has_err = arg_ty(infer, site, 0).err_type().is_some();
    test_response_part(infer, site, has_err);
    Ok(())
}

fn fill_nft(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let Type::Nft(token) = arg_ty(infer, site, 0) else {
        return Err(Diagnostic::internal("nft operation on a non-nft value"));
    };
    infer.ensure_equal(&token, &arg_ty(infer, site, 1), Some("nft asset id"))?;
    infer.ast.set_ty(site.node, site.entry.ret.clone());
    Ok(())
}

fn fill_from_consensus_buff(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let Type::Typedef(target) = arg_ty(infer, site, 0) else {
        return Err(Diagnostic::internal("from-consensus-buff? without a type argument"));
    };
    infer.ast.set_ty(site.node, Type::optional(*target));
    Ok(())
}

fn fill_utf8_to_ascii(infer: &mut Infer<'_>, site: &CallSite<'_>) -> Result<(), Diagnostic> {
    let Some(Lit::Str(text)) = infer.ast.lit(site.args[0]).cloned() else {
        return Err(Diagnostic::error(
            Category::NotSupported,
            "argument 1 must be a literal string",
        ));
    };
    if text.chars().any(|c| u32::from(c) > 255) {
        return Err(Diagnostic::error(
            Category::InvalidLiteralValue,
            format!("the string in argument 1 '{text}' is not ascii"),
        ));
    }
    let size = text.chars().count() as u128;
    infer.ast.reset(
        site.node,
        NodeKind::Lit(Lit::Str(text)),
        Type::StringAscii(Some(size)),
    );
    Ok(())
}
