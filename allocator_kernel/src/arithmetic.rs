//! Allocator Kernel v1: arithmetic primitives.
//!
//! All counts are i64. Proportional shares are computed in i128 so that
//! `requested * remaining` never overflows. No float anywhere.

use crate::error::{KernelError, KernelResult};

/// Checked count addition.
pub fn checked_add(a: i64, b: i64) -> KernelResult<i64> {
    a.checked_add(b)
        .ok_or_else(|| KernelError::Overflow(format!("{} + {} overflows i64", a, b)))
}

/// Checked count subtraction.
pub fn checked_sub(a: i64, b: i64) -> KernelResult<i64> {
    a.checked_sub(b)
        .ok_or_else(|| KernelError::Overflow(format!("{} - {} overflows i64", a, b)))
}

/// Checked sum of a slice of counts.
pub fn checked_sum(values: &[i64]) -> KernelResult<i64> {
    values.iter().try_fold(0i64, |acc, &v| checked_add(acc, v))
}

/// Exact proportional share `requested * remaining / aggregate`.
///
/// Returns `(floor, remainder_numerator)` where the fractional part of the
/// share equals `remainder_numerator / aggregate`. `aggregate` must be > 0.
pub fn proportional_share(requested: i64, remaining: i64, aggregate: i64) -> KernelResult<(i64, i64)> {
    if aggregate <= 0 {
        return Err(KernelError::Overflow(format!(
            "proportional share with non-positive aggregate {}",
            aggregate
        )));
    }
    let product = requested as i128 * remaining as i128;
    let aggregate = aggregate as i128;
    let floor = product.div_euclid(aggregate);
    let remainder = product.rem_euclid(aggregate);
    let floor = i64::try_from(floor)
        .map_err(|_| KernelError::Overflow(format!("share {} exceeds i64", floor)))?;
    // remainder < aggregate <= i64::MAX
    Ok((floor, remainder as i64))
}

/// Validate that an identifier is non-empty and printable.
pub fn validate_id(id: &str) -> KernelResult<()> {
    if id.is_empty() || id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(KernelError::Config(format!(
            "Invalid identifier {:?}: must be non-empty with no whitespace",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_add_ok() {
        assert_eq!(checked_add(3, 4).unwrap(), 7);
        assert_eq!(checked_add(-10, 5).unwrap(), -5);
    }

    #[test]
    fn test_checked_add_overflow() {
        let err = checked_add(i64::MAX, 1).unwrap_err();
        assert!(matches!(err, KernelError::Overflow(_)));
    }

    #[test]
    fn test_checked_sub_overflow() {
        assert!(checked_sub(i64::MIN, 1).is_err());
        assert_eq!(checked_sub(10, 4).unwrap(), 6);
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum(&[1, 2, 3]).unwrap(), 6);
        assert_eq!(checked_sum(&[]).unwrap(), 0);
        assert!(checked_sum(&[i64::MAX, 1]).is_err());
    }

    #[test]
    fn test_proportional_share_exact() {
        // 6 * 10 / 13 = 4 + 8/13
        assert_eq!(proportional_share(6, 10, 13).unwrap(), (4, 8));
        // 7 * 10 / 13 = 5 + 5/13
        assert_eq!(proportional_share(7, 10, 13).unwrap(), (5, 5));
        assert_eq!(proportional_share(0, 10, 13).unwrap(), (0, 0));
    }

    #[test]
    fn test_proportional_share_large_values() {
        let big = i64::MAX / 2;
        let (floor, rem) = proportional_share(big, big, big).unwrap();
        assert_eq!(floor, big);
        assert_eq!(rem, 0);
    }

    #[test]
    fn test_proportional_share_zero_aggregate() {
        assert!(proportional_share(1, 1, 0).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("ATP[c]").is_ok());
        assert!(validate_id("ecoli-tf-binding").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("has space").is_err());
    }
}
