// Literal escaping and identifier checks for MySQL statement text

use super::error::FilterError;
use super::types::SqlValue;

/// Store expressions that are emitted verbatim instead of being quoted.
pub const STORE_KEYWORDS: &[&str] = &["now()", "null", "true", "false", "CURDATE()"];

/// Returns the keyword when the trimmed input matches one exactly.
pub fn keyword(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim();
    STORE_KEYWORDS.iter().copied().find(|k| *k == trimmed)
}

/// Escapes the characters MySQL treats specially inside a quoted literal.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out
}

pub fn quote(raw: &str) -> String {
    format!("'{}'", escape(raw))
}

/// Inline literal for a bound value. Numbers and booleans are not quoted.
pub fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "true".to_string(),
        SqlValue::Bool(false) => "false".to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::UInt(u) => u.to_string(),
        SqlValue::Float(f) if f.is_finite() => f.to_string(),
        SqlValue::Float(_) => "NULL".to_string(),
        SqlValue::Text(s) => quote(s),
    }
}

/// `name` or `table.name`, each segment `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let segments: Vec<&str> = name.split('.').collect();
    segments.len() <= 2
        && segments.iter().all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

pub fn validate_identifier(name: &str) -> Result<&str, FilterError> {
    let name = name.trim();
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(FilterError::InvalidIdentifier(format!(
            "'{}' is not a valid column or table name",
            name
        )))
    }
}
