//! # Phone Numbers
//!
//! Safaricom accepts MSISDNs as `2547XXXXXXXX` or `2541XXXXXXXX`.

use shop_core::{ShopError, ShopResult};

/// Normalize `07…`, `01…`, `+254…` or `254…` into `254XXXXXXXXX`.
///
/// Spaces and dashes are ignored.
pub fn normalize_phone(input: &str) -> ShopResult<String> {
    let digits: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    let digits = digits.strip_prefix('+').unwrap_or(&digits);

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(input));
    }

    let subscriber = if let Some(rest) = digits.strip_prefix("254") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        return Err(invalid(input));
    };

    if subscriber.len() != 9 || !(subscriber.starts_with('7') || subscriber.starts_with('1')) {
        return Err(invalid(input));
    }

    Ok(format!("254{}", subscriber))
}

fn invalid(input: &str) -> ShopError {
    ShopError::Validation(format!(
        "Invalid M-Pesa phone number '{}', expected 2547XXXXXXXX",
        input
    ))
}
