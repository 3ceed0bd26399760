//! Number formatting for report output
//!
//! Amounts use `,` as the thousands separator and `.` as the decimal point.

use rust_decimal::Decimal;

/// Insert thousands separators into a plain digit string.
fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Core formatting function: `scale` decimal places, thousands separators,
/// right-aligned to `width` when `width > 0`.
///
/// # Examples
/// ```
/// use portfolio_summary::utils::format_number;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_number(dec!(1234567.891), 2, 0), "1,234,567.89");
/// assert_eq!(format_number(dec!(-1234), 0, 8), "  -1,234");
/// ```
pub fn format_number(value: Decimal, scale: u32, width: usize) -> String {
    let rounded = value.round_dp(scale);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let formatted = format!("{:.*}", scale as usize, rounded.abs());
    let (integer_part, decimal_part) = match formatted.split_once('.') {
        Some((int, dec)) => (int, Some(dec)),
        None => (formatted.as_str(), None),
    };

    let mut result = format!("{}{}", sign, group_thousands(integer_part));
    if let Some(decimals) = decimal_part {
        result.push('.');
        result.push_str(decimals);
    }

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

/// Money in the operating currency: "1,234.56"
///
/// # Examples
/// ```
/// use portfolio_summary::utils::format_amount;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_amount(dec!(1234.5)), "1,234.50");
/// assert_eq!(format_amount(dec!(-0.001)), "0.00");
/// ```
pub fn format_amount(value: Decimal) -> String {
    format_number(value, 2, 0)
}

/// Percentage with two decimals: "9.09%"
///
/// # Examples
/// ```
/// use portfolio_summary::utils::format_percent;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_percent(dec!(9.0909)), "9.09%");
/// assert_eq!(format_percent(dec!(-12.5)), "-12.50%");
/// ```
pub fn format_percent(value: Decimal) -> String {
    format!("{}%", format_number(value, 2, 0))
}

/// Units keep the precision they were booked with
pub fn format_units(value: Decimal) -> String {
    format_number(value, value.normalize().scale(), 0)
}
