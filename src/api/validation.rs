//! Input validation for API requests.
//!
//! Each extractor takes a raw query parameter or body field and returns the
//! cleaned value, or `None` when the input is missing or malformed. Handlers
//! turn `None` into a "missing field" response.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::auth::TOKEN_ID_LEN;
use crate::models::CartLine;

/// Shortest accepted password, after trimming
pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    /// Regex for validating email addresses
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*$"
    ).unwrap();
}

/// A trimmed, non-empty string
pub fn non_empty(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A trimmed email address
pub fn email(value: Option<&str>) -> Option<String> {
    non_empty(value).filter(|email| EMAIL_REGEX.is_match(email))
}

pub fn password(value: Option<&str>) -> Option<String> {
    non_empty(value).filter(|password| password.chars().count() >= MIN_PASSWORD_LEN)
}

/// A token identifier of the generated length
pub fn token_id(value: Option<&str>) -> Option<String> {
    non_empty(value).filter(|id| id.chars().count() == TOKEN_ID_LEN)
}

/// Only a literal `true` counts
pub fn accepted(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

/// A menu item id, given as a number or a numeric string
pub fn item_id(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A non-empty list of `{id, amount}` lines with positive amounts
pub fn cart_lines(value: Option<&Value>) -> Option<Vec<CartLine>> {
    let items = value?.as_array()?;
    if items.is_empty() {
        return None;
    }

    items
        .iter()
        .map(|item| {
            let id = item_id(item.get("id"))?;
            let amount = item.get("amount")?.as_u64()?;
            let amount = u32::try_from(amount).ok().filter(|a| *a > 0)?;
            Some(CartLine::new(id, amount))
        })
        .collect()
}
