//! Callable signatures and overload resolution.

use crystal_diag::{Category, Diagnostic};
use crystal_types::{Type, equal_strict, pretty_types};

/// One position in a signature.
#[derive(Debug, Clone, PartialEq)]
pub enum AbiArg {
    Ty(Type),
    /// Any of several types.
    OneOf(Vec<Type>),
    /// A user function or builtin reference.
    Callable,
    /// Second to last: zero or more of the following type. Last: zero or
    /// more further arguments of the preceding type.
    Repeat,
}

impl AbiArg {
    fn pretty(&self) -> String {
        match self {
            AbiArg::Ty(ty) => ty.to_string(),
            AbiArg::OneOf(tys) => pretty_types(tys, false),
            AbiArg::Callable => "func,syscall_ref".to_string(),
            AbiArg::Repeat => "...".to_string(),
        }
    }
}

/// A signature: argument patterns and the return type.
#[derive(Debug, Clone, PartialEq)]
pub struct AbiEntry {
    pub args: Vec<AbiArg>,
    pub ret: Type,
}

impl AbiEntry {
    pub fn new(args: Vec<AbiArg>, ret: Type) -> Self {
        Self { args, ret }
    }

    /// Signature with plain argument types.
    pub fn of(args: impl IntoIterator<Item = Type>, ret: Type) -> Self {
        Self::new(args.into_iter().map(AbiArg::Ty).collect(), ret)
    }

    /// Fewest arguments accepted, and the most when bounded.
    fn arg_count(&self) -> (usize, Option<usize>) {
        match self.args.iter().position(|a| *a == AbiArg::Repeat) {
            Some(min) => (min, None),
            None => (self.args.len(), Some(self.args.len())),
        }
    }
}

/// The signature a call resolved to.
#[derive(Debug)]
pub struct AbiMatch<'e> {
    pub index: usize,
    pub entry: &'e AbiEntry,
    /// Optional arguments that fit only once unwrapped.
    pub unwrap: Vec<usize>,
}

/// Pick the first signature `args` fit.
///
/// With `unwrap_optional`, an optional argument whose item type fits a
/// non-optional position matches too and is reported in
/// [`AbiMatch::unwrap`].
pub fn resolve<'e>(
    name: &str,
    entries: &'e [AbiEntry],
    args: &[Type],
    unwrap_optional: bool,
) -> Result<AbiMatch<'e>, Diagnostic> {
    let mut first_error = None;
    for (index, entry) in entries.iter().enumerate() {
        match match_entry(name, entry, args, unwrap_optional) {
            Ok(unwrap) => return Ok(AbiMatch { index, entry, unwrap }),
            Err(e) if e.category == Category::Internal => return Err(e),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) if entries.len() == 1 => Err(e),
        _ => Err(Diagnostic::error(
            Category::ArgumentMismatch,
            format!(
                "no suitable call to {name} could be found having arguments of type {}",
                pretty_types(args, false)
            ),
        )),
    }
}

fn match_entry(
    name: &str,
    entry: &AbiEntry,
    args: &[Type],
    unwrap_optional: bool,
) -> Result<Vec<usize>, Diagnostic> {
    let (min, max) = entry.arg_count();
    if args.len() < min {
        return Err(Diagnostic::error(
            Category::Argument,
            format!(
                "too few arguments to '{name}'. expected {min} but only got {}",
                args.len()
            ),
        ));
    }
    if let Some(max) = max
        && args.len() > max
    {
        return Err(Diagnostic::error(
            Category::Argument,
            format!("too many arguments to '{name}'. expected {max} but got {}", args.len()),
        ));
    }

    let patterns = &entry.args;
    let mut unwrap = Vec::new();
    let mut pos = 0;
    for (idx, arg) in args.iter().enumerate() {
        let Some(mut pattern) = patterns.get(pos) else {
            return Err(Diagnostic::error(
                Category::Argument,
                format!("too many arguments for {name}"),
            ));
        };
        if *pattern == AbiArg::Repeat {
            pattern = if pos + 2 == patterns.len() {
                &patterns[pos + 1]
            } else if pos + 1 == patterns.len() && pos > 0 {
                &patterns[pos - 1]
            } else {
                return Err(Diagnostic::internal(format!(
                    "invalid use of '...' in the signature of '{name}'"
                )));
            };
        } else {
            pos += 1;
        }

        let candidates: &[Type] = match pattern {
            AbiArg::Ty(Type::Any) | AbiArg::Repeat => &[],
            AbiArg::Callable => {
                if arg.is_callable() {
                    continue;
                }
                return Err(mismatch(name, idx, arg, pattern));
            }
            AbiArg::Ty(ty) => std::slice::from_ref(ty),
            AbiArg::OneOf(tys) => tys,
        };
        if candidates.is_empty() {
            continue;
        }
        let mut same = false;
        for candidate in candidates {
            if unwrap_optional
                && arg.is_optional()
                && !candidate.is_optional()
                && let Some(item) = arg.item_type()
                && equal_strict(candidate, &item)?
            {
                unwrap.push(idx);
                same = true;
                break;
            }
            if equal_strict(candidate, arg)? {
                same = true;
                break;
            }
        }
        if !same {
            return Err(mismatch(name, idx, arg, pattern));
        }
    }

    if pos < patterns.len() && patterns[pos] != AbiArg::Repeat {
        return Err(Diagnostic::error(
            Category::Argument,
            format!("too few arguments for {name}"),
        ));
    }
    Ok(unwrap)
}

fn mismatch(name: &str, idx: usize, arg: &Type, pattern: &AbiArg) -> Diagnostic {
    Diagnostic::error(
        Category::TypeMismatch,
        format!(
            "argument {} to {name} is a '{arg}' but expected '{}'",
            idx + 1,
            pattern.pretty()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_or_uint_variadic() -> Vec<AbiEntry> {
        vec![
            AbiEntry::new(vec![AbiArg::Ty(Type::Int), AbiArg::Repeat], Type::Int),
            AbiEntry::new(vec![AbiArg::Ty(Type::Uint), AbiArg::Repeat], Type::Uint),
        ]
    }

    #[test]
    fn overloads_pick_the_first_fit() {
        let entries = int_or_uint_variadic();
        let m = resolve("+", &entries, &[Type::Uint, Type::Uint, Type::Uint], false).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.entry.ret, Type::Uint);
    }

    #[test]
    fn no_overload_fits() {
        let entries = int_or_uint_variadic();
        let err = resolve("+", &entries, &[Type::Int, Type::Bool], false).unwrap_err();
        assert_eq!(err.category, Category::ArgumentMismatch);
        assert_eq!(
            err.message,
            "no suitable call to + could be found having arguments of type int,bool"
        );
    }

    #[test]
    fn single_signature_reports_its_own_error() {
        let entries = vec![AbiEntry::of([Type::Uint], Type::Bool)];
        let err = resolve("f", &entries, &[Type::Int], false).unwrap_err();
        assert_eq!(err.category, Category::TypeMismatch);
        assert_eq!(err.message, "argument 1 to f is a 'int' but expected 'uint'");

        let err = resolve("f", &entries, &[], false).unwrap_err();
        assert_eq!(err.category, Category::Argument);
        assert_eq!(err.message, "too few arguments to 'f'. expected 1 but only got 0");

        let err = resolve("f", &entries, &[Type::Uint, Type::Uint], false).unwrap_err();
        assert_eq!(err.message, "too many arguments to 'f'. expected 1 but got 2");
    }

    #[test]
    fn leading_repeat_accepts_zero_or_more() {
        let entries = vec![AbiEntry::new(
            vec![AbiArg::Callable, AbiArg::Repeat, AbiArg::Ty(Type::Any)],
            Type::any_response(),
        )];
        assert!(resolve("contract-call?", &entries, &[Type::Builtin("+".into())], false).is_ok());
        assert!(
            resolve(
                "contract-call?",
                &entries,
                &[Type::Builtin("+".into()), Type::Int, Type::Bool],
                false
            )
            .is_ok()
        );
    }

    #[test]
    fn optionals_unwrap_on_request() {
        let entries = vec![AbiEntry::of([Type::Uint, Type::Uint], Type::Uint)];
        let args = [Type::Uint, Type::optional(Type::Uint)];
        assert!(resolve("f", &entries, &args, false).is_err());
        let m = resolve("f", &entries, &args, true).unwrap();
        assert_eq!(m.unwrap, vec![1]);
    }

    #[test]
    fn sizes_are_upper_bounds() {
        let entries = vec![AbiEntry::of([Type::Buff(Some(32))], Type::Bool)];
        assert!(resolve("f", &entries, &[Type::Buff(Some(20))], false).is_ok());
        let err = resolve("f", &entries, &[Type::Buff(Some(33))], false).unwrap_err();
        assert_eq!(err.category, Category::Size);
    }

    #[test]
    fn one_of_lists_alternatives() {
        let entries = vec![AbiEntry::new(
            vec![AbiArg::OneOf(vec![Type::Int, Type::Uint])],
            Type::StringAscii(Some(40)),
        )];
        assert!(resolve("int-to-ascii", &entries, &[Type::Uint], false).is_ok());
        let err = resolve("int-to-ascii", &entries, &[Type::Bool], false).unwrap_err();
        assert_eq!(
            err.message,
            "argument 1 to int-to-ascii is a 'bool' but expected 'int,uint'"
        );
    }
}
