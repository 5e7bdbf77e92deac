//! Precision/scale checks for fixed-point target columns.
//!
//! All arithmetic is exact (`rust_decimal`); values are never routed through
//! floating point.

use rust_decimal::Decimal;

/// Parse decimal text exactly.
///
/// Surrounding whitespace and a single leading `+` are accepted, as is
/// scientific notation. Text that would need rounding to fit 28 digits is
/// not parseable.
pub fn parse_exact(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned.is_empty() || (trimmed != unsigned && unsigned.starts_with(['+', '-'])) {
        return None;
    }
    if unsigned.contains(['e', 'E']) {
        Decimal::from_scientific(unsigned).ok()
    } else {
        Decimal::from_str_exact(unsigned).ok()
    }
}

/// Whether `text` is a number that fits `NUMBER(precision, scale)`.
///
/// ```
/// use mysql_pg_sync::convert::numeric::fits;
///
/// assert!(fits("123.45", 6, 2));
/// assert!(!fits("123456.7", 6, 1));
/// ```
pub fn fits(text: &str, precision: u32, scale: u32) -> bool {
    parse_exact(text).is_some_and(|d| decimal_fits(&d, precision, scale))
}

/// Digit analysis on an already parsed value.
///
/// Trailing fractional zeros count toward the scale (`1.50` has scale 2).
pub fn decimal_fits(value: &Decimal, precision: u32, scale: u32) -> bool {
    let value_scale = value.scale();
    if value_scale > scale {
        return false;
    }
    let digits = digit_count(value.mantissa().unsigned_abs());
    let integer_digits = digits.saturating_sub(value_scale);
    integer_digits + value_scale <= precision
}

fn digit_count(mut n: u128) -> u32 {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}
