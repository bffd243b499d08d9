//! Fixed-point money helpers.
//!
//! Amounts are `i64` minor units (cents). Rates are basis points where
//! `10_000` is 100%. Intermediate products are widened to `i128` so
//! `amount * rate` never overflows for any representable amount.

/// 100% expressed in basis points.
pub const BASIS_POINTS_SCALE: u32 = 10_000;

/// `round_half_up(amount_minor * rate_bps / 10_000)` for non-negative inputs.
pub fn apply_rate_half_up(amount_minor: i64, rate_bps: u32) -> i64 {
    let scale = i128::from(BASIS_POINTS_SCALE);
    let product = i128::from(amount_minor) * i128::from(rate_bps);
    let rounded = (product + scale / 2).div_euclid(scale);
    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Ceiling division for a non-negative numerator and positive divisor.
pub fn div_ceil(numerator: i64, divisor: i64) -> i64 {
    debug_assert!(divisor > 0);
    if numerator <= 0 {
        return numerator / divisor;
    }
    (numerator + divisor - 1) / divisor
}

/// Render minor units as a major-unit decimal string (`1234` -> `"12.34"`).
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn five_percent_of_forty() {
        assert_eq!(apply_rate_half_up(4_000, 500), 200);
    }

    #[test]
    fn rounds_half_up() {
        // 0.5% of 1 minor unit is 0.005 -> 0
        assert_eq!(apply_rate_half_up(1, 50), 0);
        // 5% of 10 minor units is 0.5 -> 1
        assert_eq!(apply_rate_half_up(10, 500), 1);
        // 5% of 9 minor units is 0.45 -> 0
        assert_eq!(apply_rate_half_up(9, 500), 0);
    }

    #[test]
    fn ceil_division() {
        assert_eq!(div_ceil(10, 3), 4);
        assert_eq!(div_ceil(9, 3), 3);
        assert_eq!(div_ceil(0, 3), 0);
    }

    #[test]
    fn formats_major_units() {
        assert_eq!(format_minor(1234), "12.34");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-250), "-2.50");
    }

    proptest! {
        #[test]
        fn rate_never_exceeds_amount(amount in 0i64..1_000_000_000_000, bps in 0u32..=10_000) {
            let tax = apply_rate_half_up(amount, bps);
            prop_assert!(tax >= 0);
            prop_assert!(tax <= amount);
        }
    }
}
