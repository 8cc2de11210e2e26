//! Approximate serialized value sizes.
//!
//! The target runtime rejects values larger than [`MAX_VALUE_SIZE`]. The
//! foreach lowering uses these estimates to pick a worst-case capacity for
//! the list of collected results.

use crystal_diag::Diagnostic;

use crate::{MapType, Size, Type};

pub const MAX_VALUE_SIZE: u128 = 1024 * 1024;
pub const CHAR_SIZE: u128 = 4;
pub const NUMBER_SIZE: u128 = 16;
pub const BOOL_SIZE: u128 = 1;
pub const STX_ADDRESS_LENGTH: u128 = 41;

const SAFETY_MARGIN: u128 = 100;

/// Estimated size in bytes of one value of `ty`.
pub fn unit_size(ty: &Type) -> Result<u128, Diagnostic> {
    match ty {
        Type::Int | Type::Uint => Ok(NUMBER_SIZE),
        Type::Bool => Ok(BOOL_SIZE),
        Type::String(size) => Ok((sized(ty, *size)? + 1) * CHAR_SIZE),
        Type::StringAscii(size) | Type::Buff(size) => Ok(sized(ty, *size)? + 1),
        Type::Principal => Ok((STX_ADDRESS_LENGTH + 1) * CHAR_SIZE),
        Type::Optional(item) => Ok(1 + unit_size(item)?),
        Type::Response(r) => {
            let ok = r.ok.as_deref().map(unit_size).transpose()?.unwrap_or(0);
            let err = r.err.as_deref().map(unit_size).transpose()?.unwrap_or(0);
            Ok(1 + ok.max(err))
        }
        Type::List(item, size) => {
            if matches!(**item, Type::Empty) {
                return Ok(1);
            }
            Ok(sized(ty, *size)?.saturating_mul(unit_size(item)?))
        }
        Type::Map(MapType::Fields(fields)) => {
            let mut total: u128 = 4;
            for (key, val) in fields {
                total = total
                    .saturating_add((key.chars().count() as u128 + 2) * CHAR_SIZE)
                    .saturating_add(unit_size(val)?);
            }
            Ok(total)
        }
        other => Err(Diagnostic::internal(format!(
            "cannot estimate the size of type '{other}'"
        ))),
    }
}

/// Largest number of `item` values that fit in one list value.
pub fn max_list_size(item: &Type) -> Result<Size, Diagnostic> {
    if matches!(item, Type::Empty) {
        return Ok(0);
    }
    let unit = unit_size(item)?.max(1);
    Ok((MAX_VALUE_SIZE / unit).saturating_sub(SAFETY_MARGIN))
}

fn sized(ty: &Type, size: Option<Size>) -> Result<Size, Diagnostic> {
    size.ok_or_else(|| Diagnostic::internal(format!("type '{ty}' has no maximum size")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_costs() {
        assert_eq!(max_list_size(&Type::Int).unwrap(), MAX_VALUE_SIZE / 16 - 100);
        assert_eq!(max_list_size(&Type::Bool).unwrap(), MAX_VALUE_SIZE - 100);
        assert_eq!(max_list_size(&Type::Empty).unwrap(), 0);
    }

    #[test]
    fn strings_and_principals_pay_per_char() {
        assert_eq!(unit_size(&Type::String(Some(9))).unwrap(), 40);
        assert_eq!(unit_size(&Type::Principal).unwrap(), 168);
        let err = unit_size(&Type::String(None)).unwrap_err();
        assert!(err.message.contains("no maximum size"));
    }

    #[test]
    fn nested_lists_and_maps_recurse() {
        let inner = Type::list(Type::Uint, Some(10));
        assert_eq!(unit_size(&inner).unwrap(), 160);
        let record = Type::map([("id", Type::Uint), ("ok", Type::Bool)]);
        // 4 + (2+2)*4 + 16 + (2+2)*4 + 1
        assert_eq!(unit_size(&record).unwrap(), 53);
        assert!(max_list_size(&record).unwrap() < max_list_size(&Type::Bool).unwrap());
    }

    #[test]
    fn huge_items_saturate_to_zero() {
        let huge = Type::list(Type::String(Some(u64::MAX as u128)), Some(u64::MAX as u128));
        assert_eq!(max_list_size(&huge).unwrap(), 0);
    }
}
