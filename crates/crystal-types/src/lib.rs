//! Type representations for Crystal.
//!
//! This crate defines the value-type algebra shared by every pass: the
//! [`Type`] descriptor, plain and strict compatibility ([`equal`],
//! [`equal_strict`]), result-type merging, pretty printing, and the value
//! size model in [`sizes`].
//!
//! Types never own tree nodes. References to declarations (functions,
//! traits, extern contracts) are [`NodeId`] handles into the syntax arena.

pub mod sizes;

use std::fmt;

use crystal_diag::{Category, Diagnostic};
use indexmap::IndexMap;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Handle to a node in the syntax arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Maximum size bound of strings, buffers and lists.
pub type Size = u128;

// ---------------------------------------------------------------------------
// Type descriptor
// ---------------------------------------------------------------------------

/// A value type.
///
/// `Unknown` at any required position means inference has not finished
/// with the node yet. It is distinct from [`Type::None`], the type of the
/// `none` literal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Type {
    #[default]
    Unknown,
    Int,
    Uint,
    Bool,
    /// utf8 string with an optional maximum length in characters.
    String(Option<Size>),
    StringAscii(Option<Size>),
    Buff(Option<Size>),
    Principal,
    Optional(Box<Type>),
    Response(ResponseType),
    List(Box<Type>, Option<Size>),
    Map(MapType),
    /// Reference to a user function or a trait/extern member function.
    Func(FuncRef),
    /// Reference to a builtin operation, by name.
    Builtin(String),
    Trait(TraitTarget),
    /// The value is a trait declaration.
    TraitDef(NodeId),
    /// Persistent map.
    DataMap(Box<Type>, Box<Type>),
    /// Fungible token.
    Ft,
    /// Non-fungible token with its token id type.
    Nft(Box<Type>),
    /// A type used as a value, e.g. the argument of `from-consensus-buff?`.
    Typedef(Box<Type>),
    /// An extern contract alias.
    ExternDecl(ExternRef),
    /// Abstract sequence: matches string, string-ascii, buff and list.
    Seq,
    /// Matching-only wildcard `*`.
    Any,
    /// Matching-only `+`: anything except optional and none.
    NonOptional,
    /// Only known at runtime.
    Runtime,
    /// The type of the `none` literal.
    None,
    /// Item type of an empty list literal.
    Empty,
}

/// ok/err parts of a result. A missing part is unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseType {
    pub ok: Option<Box<Type>>,
    pub err: Option<Box<Type>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapType {
    /// Matches any set of fields.
    Any,
    Fields(IndexMap<String, Type>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncRef {
    /// The function definition or extern/trait member declaration.
    pub def: NodeId,
    /// For trait members: the expression naming the implementing contract.
    pub implementor: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternRef {
    pub decl: NodeId,
    pub alias: String,
    /// Contract trait ids the extern contract declares it implements.
    pub trait_impls: Vec<String>,
}

/// What a trait-typed value must implement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraitTarget {
    /// Matching-only: any trait.
    Any,
    /// Not resolved yet: the expression naming the trait.
    Pending(NodeId),
    /// A trait given directly as a contract principal.
    Principal(String),
    /// An imported trait declaration and its full contract id.
    Def { def: NodeId, contract_id: String },
}

impl TraitTarget {
    pub fn contract_id(&self) -> Option<&str> {
        match self {
            TraitTarget::Principal(cid) => Some(cid),
            TraitTarget::Def { contract_id, .. } => Some(contract_id),
            TraitTarget::Any | TraitTarget::Pending(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Constructors and matching patterns
// ---------------------------------------------------------------------------

impl Type {
    pub fn optional(item: Type) -> Self {
        Type::Optional(Box::new(item))
    }

    pub fn list(item: Type, size: Option<Size>) -> Self {
        Type::List(Box::new(item), size)
    }

    pub fn response(ok: Option<Type>, err: Option<Type>) -> Self {
        Type::Response(ResponseType {
            ok: ok.map(Box::new),
            err: err.map(Box::new),
        })
    }

    pub fn map<K: Into<String>>(fields: impl IntoIterator<Item = (K, Type)>) -> Self {
        Type::Map(MapType::Fields(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn optional_of_any() -> Self {
        Type::optional(Type::Any)
    }

    pub fn list_of_any() -> Self {
        Type::list(Type::Any, None)
    }

    pub fn trait_of_any() -> Self {
        Type::Trait(TraitTarget::Any)
    }

    pub fn any_map() -> Self {
        Type::Map(MapType::Any)
    }

    pub fn any_response() -> Self {
        Type::Response(ResponseType::default())
    }

    pub fn ok_response_of_any() -> Self {
        Type::response(Some(Type::Any), None)
    }

    pub fn err_response_of_any() -> Self {
        Type::response(None, Some(Type::Any))
    }

    /// Plain compatibility with a pattern, e.g. `ty.is(&Type::optional_of_any())`.
    pub fn is(&self, pattern: &Type) -> bool {
        equal(self, pattern)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Type::None)
    }

    pub fn is_optional(&self) -> bool {
        self.is(&Type::optional_of_any())
    }

    pub fn is_response(&self) -> bool {
        self.is(&Type::any_response())
    }

    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            Type::List(..) | Type::String(_) | Type::StringAscii(_) | Type::Buff(_)
        )
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Type::Func(_) | Type::Builtin(_))
    }

    /// Whether inference still has work to do on this type. Looks at the
    /// top level and the direct children only.
    pub fn is_undetermined(&self) -> bool {
        fn unknown(t: &Type) -> bool {
            matches!(t, Type::Unknown)
        }
        match self {
            Type::Unknown => true,
            Type::Optional(item) | Type::List(item, _) | Type::Nft(item) | Type::Typedef(item) => {
                unknown(item)
            }
            Type::Response(r) => {
                r.ok.as_deref().is_some_and(unknown) || r.err.as_deref().is_some_and(unknown)
            }
            Type::DataMap(key, val) => unknown(key) || unknown(val),
            _ => false,
        }
    }

    pub fn size(&self) -> Option<Size> {
        match self {
            Type::String(size)
            | Type::StringAscii(size)
            | Type::Buff(size)
            | Type::List(_, size) => *size,
            _ => None,
        }
    }

    pub fn set_size(&mut self, new_size: Option<Size>) {
        if let Type::String(size)
        | Type::StringAscii(size)
        | Type::Buff(size)
        | Type::List(_, size) = self
        {
            *size = new_size;
        }
    }

    /// Item type of a sequence: the element type of a list, or a
    /// one-element string/buffer for strings and buffers.
    pub fn item_type(&self) -> Option<Type> {
        match self {
            Type::List(item, _) => Some((**item).clone()),
            Type::String(_) => Some(Type::String(Some(1))),
            Type::StringAscii(_) => Some(Type::StringAscii(Some(1))),
            Type::Buff(_) => Some(Type::Buff(Some(1))),
            Type::Optional(item) => Some((**item).clone()),
            _ => None,
        }
    }

    pub fn ok_type(&self) -> Option<&Type> {
        match self {
            Type::Response(r) => r.ok.as_deref(),
            _ => None,
        }
    }

    pub fn err_type(&self) -> Option<&Type> {
        match self {
            Type::Response(r) => r.err.as_deref(),
            _ => None,
        }
    }

    pub fn map_fields(&self) -> Option<&IndexMap<String, Type>> {
        match self {
            Type::Map(MapType::Fields(fields)) => Some(fields),
            _ => None,
        }
    }

    /// Pick the type to copy onto a node when `alt` is a fallback: a
    /// runtime-only type defers to `alt`, and `none` widens to `alt` when
    /// `alt` is optional.
    pub fn or_alt(&self, alt: &Type) -> Type {
        match self {
            Type::Runtime => alt.clone(),
            Type::None if alt.is_optional() => alt.clone(),
            _ => self.clone(),
        }
    }

    /// Human-readable rendering for machines: response parts are always
    /// spelled out and empty lists render as `list<>`.
    pub fn pretty_for_machines(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = write_pretty(&mut out, self, true);
        out
    }
}

/// Whether a contract id names a deployed (absolute) contract rather than
/// one relative to the deployer.
pub fn is_absolute_contract_id(contract_id: &str) -> bool {
    contract_id.starts_with('S')
}

// ---------------------------------------------------------------------------
// Compatibility
// ---------------------------------------------------------------------------

/// Structural compatibility. Never fails.
pub fn equal(a: &Type, b: &Type) -> bool {
    let mut help = None;
    // Only the strict mode produces errors.
    compatible(a, b, false, &mut help).unwrap_or(false)
}

/// Strict compatibility. `a` is the upper bound (e.g. a declared argument)
/// and `b` the value that must fit into it.
///
/// Raises `SizeError` when `b` declares a larger maximum size than `a`,
/// and `TraitNotImplementedError`/`AmbiguousContractIdentifierError` when
/// `b` is an extern contract that does not implement the trait `a`
/// expects. The returned diagnostics carry no location.
pub fn equal_strict(a: &Type, b: &Type) -> Result<bool, Diagnostic> {
    let mut help = None;
    compatible(a, b, true, &mut help)
}

/// Strict compatibility where a size overflow counts as incompatible.
pub fn fits(a: &Type, b: &Type) -> bool {
    equal_strict(a, b).unwrap_or(false)
}

fn compatible(a: &Type, b: &Type, strict: bool, help: &mut Option<String>) -> Result<bool, Diagnostic> {
    use Type as T;

    if matches!(a, T::Any) || matches!(b, T::Any) {
        return Ok(true);
    }
    if matches!(a, T::NonOptional) && !matches!(b, T::Optional(_) | T::None)
        || matches!(b, T::NonOptional) && !matches!(a, T::Optional(_) | T::None)
    {
        return Ok(true);
    }
    if matches!((a, b), (T::Optional(_), T::None) | (T::None, T::Optional(_))) {
        return Ok(true);
    }
    if matches!(a, T::Seq) && b.is_sequence() || matches!(b, T::Seq) && a.is_sequence() {
        return Ok(true);
    }
    if strict {
        if let (T::Trait(target), T::ExternDecl(ext)) = (a, b) {
            if !matches!(target, TraitTarget::Any) {
                return extern_implements(target, ext).map(|()| true);
            }
        }
    }

    if std::mem::discriminant(a) != std::mem::discriminant(b) {
        return Ok(false);
    }

    if strict {
        if let (Some(max), Some(size)) = (a.size(), b.size()) {
            if size > max {
                let what = help.as_deref().unwrap_or("item");
                return Err(Diagnostic::error(
                    Category::Size,
                    format!("{what} of type '{b}' exceeds the maximum size ({max})"),
                ));
            }
        }
    }

    match (a, b) {
        (T::List(x, _), T::List(y, _)) => {
            *help = Some("list element".to_string());
            compatible(x, y, strict, help)
        }
        (T::Optional(x), T::Optional(y)) => {
            *help = Some("optional".to_string());
            compatible(x, y, strict, help)
        }
        (T::Trait(x), T::Trait(y)) => Ok(traits_compatible(x, y)),
        (T::Map(x), T::Map(y)) if strict => {
            let (MapType::Fields(x), MapType::Fields(y)) = (x, y) else {
                return Ok(true);
            };
            for (key, xt) in x {
                let Some(yt) = y.get(key) else {
                    return Ok(false);
                };
                *help = Some(format!("map key '{key}'"));
                if !compatible(xt, yt, strict, help)? {
                    return Ok(false);
                }
            }
            Ok(y.keys().all(|key| x.contains_key(key)))
        }
        (T::Response(x), T::Response(y)) => {
            let ok = match (&x.ok, &y.ok) {
                (Some(xt), None) => !matches!(**xt, T::Any),
                (None, Some(yt)) => !matches!(**yt, T::Any),
                (Some(xt), Some(yt)) => {
                    *help = Some("ok".to_string());
                    compatible(xt, yt, strict, help)?
                }
                (None, None) => true,
            };
            let err = match (&x.err, &y.err) {
                (Some(xt), None) => !matches!(**xt, T::Any),
                (None, Some(yt)) => !matches!(**yt, T::Any),
                (Some(xt), Some(yt)) => {
                    *help = Some("err".to_string());
                    compatible(xt, yt, strict, help)?
                }
                (None, None) => true,
            };
            let shaped = !strict || y.ok.is_some() || y.err.is_some();
            Ok(ok && err && shaped)
        }
        _ => Ok(true),
    }
}

fn traits_compatible(a: &TraitTarget, b: &TraitTarget) -> bool {
    match (a.contract_id(), b.contract_id()) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

fn extern_implements(target: &TraitTarget, ext: &ExternRef) -> Result<(), Diagnostic> {
    let Some(t_cid) = target.contract_id() else {
        return Ok(());
    };
    let t_abs = is_absolute_contract_id(t_cid);
    let mut ambiguous = None;
    for impl_cid in &ext.trait_impls {
        if impl_cid == t_cid {
            return Ok(());
        }
        let impl_abs = is_absolute_contract_id(impl_cid);
        if t_abs && !impl_abs && t_cid.ends_with(impl_cid.as_str()) {
            ambiguous = Some(format!(
                "ambiguous trait implementation match in '{}'. There is a '{impl_cid}' trait implementation in '{}', but the type expected is for a specific contract ('{t_cid}')",
                ext.alias, ext.alias
            ));
        } else if !t_abs && impl_abs && impl_cid.ends_with(t_cid) {
            ambiguous = Some(format!(
                "ambiguous trait implementation match in '{}'. There is a '{impl_cid}' trait implementation in '{}', but the type expected is for a relative contract ('{t_cid}')",
                ext.alias, ext.alias
            ));
        }
    }
    Err(match ambiguous {
        Some(msg) => Diagnostic::error(Category::AmbiguousContractIdentifier, msg),
        None => Diagnostic::error(
            Category::TraitNotImplemented,
            format!("'{}' does not implement trait '{t_cid}'", ext.alias),
        ),
    })
}

/// Fill in result parts of `to` that `from` knows more about.
///
/// A part present only in `from` is copied. A `none` part in `to` is
/// widened to an optional part of `from`. Present parts must otherwise be
/// compatible. Returns whether `to` changed.
pub fn merge_response_types(from: &Type, to: &mut Type) -> Result<bool, Diagnostic> {
    let (Type::Response(from), Type::Response(to)) = (from, to) else {
        return Ok(false);
    };
    let ok = merge_part(from.ok.as_deref(), &mut to.ok, "ok")?;
    let err = merge_part(from.err.as_deref(), &mut to.err, "err")?;
    Ok(ok || err)
}

fn merge_part(from: Option<&Type>, to: &mut Option<Box<Type>>, which: &str) -> Result<bool, Diagnostic> {
    let Some(from) = from else {
        return Ok(false);
    };
    match to {
        None => {
            *to = Some(Box::new(from.clone()));
            Ok(true)
        }
        Some(to) => {
            if from.is_optional() && to.is_none() {
                **to = from.clone();
                return Ok(true);
            }
            if !equal(from, to) {
                return Err(Diagnostic::error(
                    Category::TypeMismatch,
                    format!("response {which} types differ"),
                ));
            }
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pretty(f, self, false)
    }
}

fn write_pretty(f: &mut impl fmt::Write, ty: &Type, machines: bool) -> fmt::Result {
    match ty {
        Type::Unknown => f.write_str("undetermined"),
        Type::Int => f.write_str("int"),
        Type::Uint => f.write_str("uint"),
        Type::Bool => f.write_str("bool"),
        Type::String(size) => write_sized(f, "string", *size),
        Type::StringAscii(size) => write_sized(f, "string-ascii", *size),
        Type::Buff(size) => write_sized(f, "buff", *size),
        Type::Principal => f.write_str("principal"),
        Type::Optional(item) => {
            f.write_str("optional ")?;
            write_pretty(f, item, machines)
        }
        Type::List(item, _) if machines && matches!(**item, Type::Empty) => f.write_str("list<>"),
        Type::List(item, size) => {
            f.write_str("list<")?;
            write_pretty(f, item, machines)?;
            f.write_str(">")?;
            match size {
                Some(size) => write!(f, "[{size}]"),
                None => Ok(()),
            }
        }
        Type::Response(r) => match (&r.ok, &r.err) {
            (ok, err) if machines || (ok.is_some() && err.is_some()) => {
                f.write_str("response<")?;
                if let Some(ok) = ok {
                    write_pretty(f, ok, machines)?;
                }
                f.write_str(",")?;
                if let Some(err) = err {
                    write_pretty(f, err, machines)?;
                }
                f.write_str(">")
            }
            (Some(ok), None) => {
                f.write_str("ok(")?;
                write_pretty(f, ok, machines)?;
                f.write_str(")")
            }
            (None, Some(err)) => {
                f.write_str("err(")?;
                write_pretty(f, err, machines)?;
                f.write_str(")")
            }
            _ => f.write_str("response"),
        },
        Type::Map(MapType::Any) => f.write_str("map"),
        Type::Map(MapType::Fields(fields)) => {
            f.write_str("{")?;
            for (idx, (key, val)) in fields.iter().enumerate() {
                if idx > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{key}:")?;
                write_pretty(f, val, machines)?;
            }
            f.write_str("}")
        }
        Type::Func(_) => f.write_str("func"),
        Type::Builtin(_) => f.write_str("syscall_ref"),
        Type::Trait(target) => match target.contract_id() {
            Some(cid) => write!(f, "trait<{cid}>"),
            None => f.write_str("trait"),
        },
        Type::TraitDef(_) => f.write_str("trait_def"),
        Type::DataMap(..) => f.write_str("datamap"),
        Type::Ft => f.write_str("ft"),
        Type::Nft(_) => f.write_str("nft"),
        Type::Typedef(_) => f.write_str("typedef"),
        Type::ExternDecl(_) => f.write_str("extern_decl"),
        Type::Seq => f.write_str("sequence (eg. list,string,buff)"),
        Type::Any => f.write_str("*"),
        Type::NonOptional => f.write_str("+"),
        Type::Runtime => f.write_str("runtime"),
        Type::None => f.write_str("none"),
        Type::Empty => f.write_str("-"),
    }
}

fn write_sized(f: &mut impl fmt::Write, name: &str, size: Option<Size>) -> fmt::Result {
    match size {
        Some(size) => write!(f, "{name}[{size}]"),
        None => f.write_str(name),
    }
}

/// Comma-joined rendering of several types.
pub fn pretty_types<'a>(types: impl IntoIterator<Item = &'a Type>, machines: bool) -> String {
    types
        .into_iter()
        .map(|t| if machines { t.pretty_for_machines() } else { t.to_string() })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(impls: &[&str]) -> Type {
        Type::ExternDecl(ExternRef {
            decl: NodeId(7),
            alias: "token".to_string(),
            trait_impls: impls.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn trait_of(cid: &str) -> Type {
        Type::Trait(TraitTarget::Def {
            def: NodeId(3),
            contract_id: cid.to_string(),
        })
    }

    #[test]
    fn wildcards_and_markers() {
        assert!(equal(&Type::Any, &Type::Bool));
        assert!(equal(&Type::NonOptional, &Type::Int));
        assert!(!equal(&Type::NonOptional, &Type::None));
        assert!(!equal(&Type::optional(Type::Int), &Type::NonOptional));
        assert!(equal(&Type::None, &Type::optional(Type::Uint)));
        assert!(equal(&Type::Seq, &Type::Buff(Some(3))));
        assert!(equal(&Type::StringAscii(None), &Type::Seq));
        assert!(!equal(&Type::Seq, &Type::Int));
        assert!(!equal(&Type::Int, &Type::Uint));
    }

    #[test]
    fn strict_size_bound() {
        let bound = Type::String(Some(5));
        assert!(equal_strict(&bound, &Type::String(Some(5))).unwrap());
        let err = equal_strict(&bound, &Type::String(Some(6))).unwrap_err();
        assert_eq!(err.category, Category::Size);
        assert_eq!(
            err.message,
            "item of type 'string[6]' exceeds the maximum size (5)"
        );
        // Plain compatibility ignores sizes.
        assert!(equal(&bound, &Type::String(Some(6))));
    }

    #[test]
    fn strict_size_messages_name_the_part() {
        let a = Type::list(Type::Buff(Some(2)), Some(4));
        let b = Type::list(Type::Buff(Some(8)), Some(1));
        let err = equal_strict(&a, &b).unwrap_err();
        assert!(err.message.starts_with("list element of type 'buff[8]'"));

        let a = Type::map([("memo", Type::String(Some(3)))]);
        let b = Type::map([("memo", Type::String(Some(9)))]);
        let err = equal_strict(&a, &b).unwrap_err();
        assert!(err.message.starts_with("map key 'memo'"));
    }

    #[test]
    fn strict_maps_need_identical_fields() {
        let a = Type::map([("a", Type::Int), ("b", Type::Bool)]);
        let b = Type::map([("b", Type::Bool), ("a", Type::Int)]);
        let c = Type::map([("a", Type::Int)]);
        assert!(fits(&a, &b));
        assert!(!fits(&a, &c));
        assert!(!fits(&c, &a));
        // Non-strict map comparison only looks at the kind.
        assert!(equal(&a, &c));
        assert!(fits(&Type::any_map(), &a));
    }

    #[test]
    fn response_parts() {
        let ok_int = Type::response(Some(Type::Int), None);
        let err_uint = Type::response(None, Some(Type::Uint));
        assert!(equal(&ok_int, &err_uint));
        assert!(ok_int.is(&Type::ok_response_of_any()));
        assert!(!err_uint.is(&Type::ok_response_of_any()));
        assert!(err_uint.is(&Type::err_response_of_any()));
        assert!(!equal(&ok_int, &Type::response(Some(Type::Bool), None)));
        // Strictly, the value side must carry at least one part.
        assert!(!fits(&ok_int, &Type::any_response()));
        assert!(fits(&Type::any_response(), &ok_int));
    }

    #[test]
    fn trait_against_extern_contract() {
        let cid = "SP000.token-trait.sip-010";
        assert!(fits(&trait_of(cid), &ext(&[cid])));

        let err = equal_strict(&trait_of(cid), &ext(&[])).unwrap_err();
        assert_eq!(err.category, Category::TraitNotImplemented);
        assert_eq!(
            err.message,
            "'token' does not implement trait 'SP000.token-trait.sip-010'"
        );

        let err = equal_strict(&trait_of(cid), &ext(&[".token-trait.sip-010"])).unwrap_err();
        assert_eq!(err.category, Category::AmbiguousContractIdentifier);

        let err = equal_strict(&trait_of(".token-trait.sip-010"), &ext(&[cid])).unwrap_err();
        assert_eq!(err.category, Category::AmbiguousContractIdentifier);
        assert!(err.message.contains("relative contract"));

        // Plain compatibility never inspects the contract.
        assert!(!equal(&trait_of(cid), &ext(&[])));
    }

    #[test]
    fn traits_compare_by_contract_id() {
        assert!(equal(&trait_of("SP1.a.t"), &trait_of("SP1.a.t")));
        assert!(!equal(&trait_of("SP1.a.t"), &trait_of("SP1.b.t")));
        assert!(equal(&Type::trait_of_any(), &trait_of("SP1.b.t")));
    }

    #[test]
    fn undetermined_looks_one_level_deep() {
        assert!(Type::Unknown.is_undetermined());
        assert!(Type::optional(Type::Unknown).is_undetermined());
        assert!(Type::response(Some(Type::Unknown), None).is_undetermined());
        assert!(!Type::optional(Type::optional(Type::Unknown)).is_undetermined());
        assert!(!Type::response(None, None).is_undetermined());
        assert!(!Type::None.is_undetermined());
    }

    #[test]
    fn merge_fills_missing_parts() {
        let mut to = Type::response(Some(Type::Int), None);
        let from = Type::response(None, Some(Type::Uint));
        assert!(merge_response_types(&from, &mut to).unwrap());
        assert_eq!(to, Type::response(Some(Type::Int), Some(Type::Uint)));
        assert!(!merge_response_types(&from, &mut to).unwrap());

        let mut to = Type::response(Some(Type::None), None);
        let from = Type::response(Some(Type::optional(Type::Int)), None);
        assert!(merge_response_types(&from, &mut to).unwrap());
        assert_eq!(to.ok_type(), Some(&Type::optional(Type::Int)));

        let mut to = Type::response(Some(Type::Bool), None);
        let err = merge_response_types(&from, &mut to).unwrap_err();
        assert_eq!(err.message, "response ok types differ");
    }

    #[test]
    fn or_alt_widens_none_and_runtime() {
        let opt = Type::optional(Type::Int);
        assert_eq!(Type::None.or_alt(&opt), opt);
        assert_eq!(Type::Runtime.or_alt(&Type::Bool), Type::Bool);
        assert_eq!(Type::None.or_alt(&Type::Bool), Type::None);
        assert_eq!(Type::Int.or_alt(&opt), Type::Int);
    }

    #[test]
    fn pretty_printing() {
        assert_eq!(Type::String(Some(12)).to_string(), "string[12]");
        assert_eq!(Type::optional(Type::Uint).to_string(), "optional uint");
        assert_eq!(
            Type::list(Type::Int, Some(5)).to_string(),
            "list<int>[5]"
        );
        assert_eq!(Type::response(Some(Type::Int), None).to_string(), "ok(int)");
        assert_eq!(Type::response(None, Some(Type::Int)).to_string(), "err(int)");
        assert_eq!(
            Type::response(Some(Type::Bool), Some(Type::Uint)).to_string(),
            "response<bool,uint>"
        );
        assert_eq!(
            Type::response(Some(Type::Bool), None).pretty_for_machines(),
            "response<bool,>"
        );
        assert_eq!(
            Type::map([("a", Type::Int), ("b", Type::Buff(Some(2)))]).to_string(),
            "{a:int,b:buff[2]}"
        );
        assert_eq!(Type::list(Type::Empty, Some(0)).pretty_for_machines(), "list<>");
        assert_eq!(trait_of("SP1.c.t").to_string(), "trait<SP1.c.t>");
        assert_eq!(
            pretty_types(&[Type::Int, Type::Bool], false),
            "int,bool"
        );
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        fn sized() -> impl Strategy<Value = fn(Option<Size>) -> Type> {
            prop_oneof![
                Just(Type::String as fn(Option<Size>) -> Type),
                Just(Type::StringAscii as fn(Option<Size>) -> Type),
                Just(Type::Buff as fn(Option<Size>) -> Type),
            ]
        }

        proptest! {
            #[test]
            fn strict_fails_exactly_when_bound_exceeded(
                make in sized(),
                bound in 0u128..10_000,
                len in 0u128..10_000,
            ) {
                let result = equal_strict(&make(Some(bound)), &make(Some(len)));
                if len > bound {
                    let err = result.unwrap_err();
                    prop_assert_eq!(err.category, Category::Size);
                } else {
                    prop_assert!(result.unwrap());
                }
            }

            #[test]
            fn none_matches_every_optional(size in proptest::option::of(0u128..64)) {
                let opt = Type::optional(Type::Buff(size));
                prop_assert!(equal(&Type::None, &opt));
                prop_assert!(equal(&opt, &Type::None));
                prop_assert!(equal_strict(&opt, &Type::None).unwrap());
            }

            #[test]
            fn merge_is_idempotent(ok in any::<bool>(), err in any::<bool>()) {
                let from = Type::response(ok.then_some(Type::Int), err.then_some(Type::Bool));
                let mut to = Type::any_response();
                merge_response_types(&from, &mut to).unwrap();
                prop_assert_eq!(&to, &from);
                prop_assert!(!merge_response_types(&from, &mut to).unwrap());
            }
        }
    }
}
