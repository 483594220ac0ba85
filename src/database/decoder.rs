//! Row decoding driven by the column types the store reports.
//!
//! Cells arrive as text (or NULL) and are converted per column type, never per
//! validation schema. Decoding does not fail: text that does not fit the
//! column type collapses to that type's zero value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::store::ColumnMeta;
use crate::coerce;

/// Store column types, grouped by how their cells decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Tiny,
    Short,
    Long,
    Int24,
    LongLong,
    Float,
    Double,
    Decimal,
    Timestamp,
    DateTime,
    Text,
}

impl ColumnType {
    /// MySQL protocol type code.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => ColumnType::Tiny,
            2 => ColumnType::Short,
            3 => ColumnType::Long,
            4 => ColumnType::Float,
            5 => ColumnType::Double,
            0 | 246 => ColumnType::Decimal,
            7 => ColumnType::Timestamp,
            8 => ColumnType::LongLong,
            9 => ColumnType::Int24,
            12 => ColumnType::DateTime,
            _ => ColumnType::Text,
        }
    }

    /// SQL type name as reported by the driver, e.g. `INT UNSIGNED`.
    pub fn from_type_name(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        match upper.trim_end_matches(" UNSIGNED") {
            "BOOLEAN" | "TINYINT" => ColumnType::Tiny,
            "SMALLINT" => ColumnType::Short,
            "INT" | "INTEGER" => ColumnType::Long,
            "MEDIUMINT" => ColumnType::Int24,
            "BIGINT" => ColumnType::LongLong,
            "FLOAT" => ColumnType::Float,
            "DOUBLE" | "REAL" => ColumnType::Double,
            "DECIMAL" | "NUMERIC" => ColumnType::Decimal,
            "TIMESTAMP" => ColumnType::Timestamp,
            "DATETIME" => ColumnType::DateTime,
            _ => ColumnType::Text,
        }
    }
}

/// How 1-byte integer columns split between booleans and integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TinyIntPolicy {
    /// Boolean when the text is one character long or its value is below 2.
    #[default]
    Legacy,
    /// Boolean only for the values 0 and 1.
    Magnitude,
}

impl TinyIntPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "legacy" => Some(TinyIntPolicy::Legacy),
            "magnitude" => Some(TinyIntPolicy::Magnitude),
            _ => None,
        }
    }
}

pub fn decode(columns: &[ColumnMeta], rows: &[Vec<Option<String>>], policy: TinyIntPolicy) -> Vec<Map<String, Value>> {
    rows.iter()
        .map(|row| {
            let mut fields = Map::new();
            for (i, column) in columns.iter().enumerate() {
                let raw = row.get(i).and_then(|cell| cell.as_deref());
                fields.insert(column.name.clone(), decode_value(column.column_type, raw, policy));
            }
            fields
        })
        .collect()
}

pub fn decode_value(column_type: ColumnType, raw: Option<&str>, policy: TinyIntPolicy) -> Value {
    let Some(raw) = raw else { return Value::Null };

    match column_type {
        ColumnType::Tiny => decode_tiny(raw, policy),
        ColumnType::Short | ColumnType::Long | ColumnType::Int24 | ColumnType::LongLong => {
            Value::Number(coerce::leading_int(raw).into())
        }
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal => {
            let mut value = coerce::leading_float(raw);
            if value == 0.0 {
                value = coerce::leading_float("0.000");
            }
            Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
        }
        ColumnType::Timestamp | ColumnType::DateTime => {
            let parsed = coerce::parse_datetime(raw).unwrap_or_default();
            Value::String(parsed.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        ColumnType::Text => Value::String(raw.to_string()),
    }
}

fn decode_tiny(raw: &str, policy: TinyIntPolicy) -> Value {
    let number = coerce::leading_int(raw);
    let as_bool = match policy {
        TinyIntPolicy::Legacy => raw.chars().count() == 1 || number < 2,
        TinyIntPolicy::Magnitude => number == 0 || number == 1,
    };
    if as_bool {
        // Only the empty string and "0" are false
        Value::Bool(!(raw.is_empty() || raw == "0"))
    } else {
        Value::Number(number.into())
    }
}
