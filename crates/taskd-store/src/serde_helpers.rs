use serde::{Deserialize, Serialize};

/// Serialize an enum variant to its serde snake_case string representation.
///
/// serde_json serializes a unit enum variant as a JSON string, e.g. `"usage_limit"`.
/// We strip the surrounding quotes to get the raw string for a TEXT column.
pub fn serde_variant_name<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    json.trim_matches('"').to_string()
}

/// Parse a serde snake_case string back into an enum variant.
pub fn parse_enum<T: for<'de> Deserialize<'de>>(s: &str) -> Option<T> {
    let json = format!("\"{s}\"");
    serde_json::from_str(&json).ok()
}

pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

pub fn from_json<T: for<'de> Deserialize<'de> + Default>(s: &str) -> T {
    serde_json::from_str(s).unwrap_or_default()
}
