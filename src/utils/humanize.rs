//! Human-readable rendering of byte sizes and element counts.
//!
//! Byte sizes scale by powers of 1024 (`B` through `EB`), counts by powers of
//! 1000 (`K`, `M`, `B`, `T`). A scaled value that is an exact integer is
//! printed without decimals, anything else with exactly two.
//!
//! # Example
//!
//! ```
//! use redis_key_analysis::utils::humanize::{format_byte_size, format_count};
//!
//! assert_eq!(format_byte_size(1536.0), "1.50 KB");
//! assert_eq!(format_byte_size(1048576.0), "1 MB");
//! assert_eq!(format_count(1500.0), "1.50K");
//! assert_eq!(format_count(2000000.0), "2M");
//! ```

use serde_json::Value;

/// Rendered in place of a value that is missing or not numeric.
pub const PLACEHOLDER: &str = "?";

const BYTE_UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
const COUNT_UNITS: [&str; 5] = ["", "K", "M", "B", "T"];

/// Formats a byte count using binary (1024) units, e.g. `"1.50 KB"`.
///
/// Values below one byte stay in `B`; values beyond the exabyte range stay in
/// `EB`. Non-finite input yields [`PLACEHOLDER`].
pub fn format_byte_size(value: f64) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    if value == 0.0 {
        return "0 B".to_string();
    }

    let (scaled, exponent) = scale(value, 1024.0, BYTE_UNITS.len() - 1);
    format!("{} {}", render(scaled), BYTE_UNITS[exponent])
}

/// Formats an element count using decimal (1000) units, e.g. `"1.50K"`.
///
/// Negative counts keep their sign and are scaled by magnitude. Non-finite
/// input yields [`PLACEHOLDER`].
pub fn format_count(value: f64) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let (scaled, exponent) = scale(value, 1000.0, COUNT_UNITS.len() - 1);
    format!("{}{}", render(scaled), COUNT_UNITS[exponent])
}

/// Formats a loosely-typed record field as a byte size.
///
/// Anything other than a JSON number (missing, null, string, bool, nested)
/// renders as [`PLACEHOLDER`].
pub fn humanize_bytes(value: Option<&Value>) -> String {
    match value.and_then(Value::as_f64) {
        Some(v) => format_byte_size(v),
        None => PLACEHOLDER.to_string(),
    }
}

/// Formats a loosely-typed record field as an element count.
pub fn humanize_count(value: Option<&Value>) -> String {
    match value.and_then(Value::as_f64) {
        Some(v) => format_count(v),
        None => PLACEHOLDER.to_string(),
    }
}

/// Picks the largest exponent `e <= max_exponent` with `base^e <= |value|`
/// (zero when `|value| < base`) and returns `value / base^e` alongside it.
fn scale(value: f64, base: f64, max_exponent: usize) -> (f64, usize) {
    let magnitude = value.abs();
    let mut exponent = 0;
    while exponent < max_exponent && magnitude >= base.powi(exponent as i32 + 1) {
        exponent += 1;
    }
    (value / base.powi(exponent as i32), exponent)
}

fn render(scaled: f64) -> String {
    if scaled.fract() == 0.0 {
        format!("{:.0}", scaled)
    } else {
        format!("{:.2}", scaled)
    }
}
