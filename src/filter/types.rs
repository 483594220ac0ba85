use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::FilterError;
use super::escape;

/// Comparison operators of the bracket filter language (`{field: {op: value}}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Eq,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Neq,
}

impl FilterOp {
    /// Resolves an operator key. The short bracket aliases (`lk`, `lks`, `lke`,
    /// `dif`) are what query strings carry.
    pub fn from_key(key: &str) -> Result<Self, FilterError> {
        Ok(match key {
            "eq" => FilterOp::Eq,
            "contains" | "lk" => FilterOp::Contains,
            "startsWith" | "lks" => FilterOp::StartsWith,
            "endsWith" | "lke" => FilterOp::EndsWith,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "neq" | "dif" => FilterOp::Neq,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => "LIKE",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Neq => "!=",
        }
    }

    /// Wraps a value into the LIKE pattern for pattern operators.
    pub fn pattern(&self, value: &str) -> Option<String> {
        match self {
            FilterOp::Contains => Some(format!("%{}%", value)),
            FilterOp::StartsWith => Some(format!("{}%", value)),
            FilterOp::EndsWith => Some(format!("%{}", value)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Anything but a case-insensitive `desc` sorts ascending.
    pub fn parse(direction: &str) -> Self {
        if direction.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

impl FilterOrderInfo {
    pub fn new(column: impl Into<String>, sort: SortDirection) -> Self {
        Self { column: column.into(), sort }
    }
}

/// One ORDER BY entry: a verbatim expression or a validated column with a direction.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEntry {
    Raw(String),
    Column(FilterOrderInfo),
}

/// A value carried into a statement as a bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    SqlValue::UInt(u)
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            // Structured values are stored as their JSON text
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlPart {
    Sql(String),
    Param(SqlValue),
}

/// Statement text interleaved with bound parameters.
///
/// `query()` renders `?` placeholders for execution; `to_inline_sql()` renders
/// every parameter as an escaped literal for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    parts: Vec<SqlPart>,
}

impl SqlFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_sql(text);
        fragment
    }

    pub fn push_sql(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        if text.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Sql(prev)) => prev.push_str(&text),
            _ => self.parts.push(SqlPart::Sql(text)),
        }
        self
    }

    pub fn push_param(&mut self, value: SqlValue) -> &mut Self {
        self.parts.push(SqlPart::Param(value));
        self
    }

    pub fn append(&mut self, other: SqlFragment) -> &mut Self {
        for part in other.parts {
            match part {
                SqlPart::Sql(text) => {
                    self.push_sql(text);
                }
                SqlPart::Param(value) => {
                    self.push_param(value);
                }
            }
        }
        self
    }

    /// Concatenates fragments with `separator` between them.
    pub fn join(fragments: impl IntoIterator<Item = SqlFragment>, separator: &str) -> Self {
        let mut joined = Self::new();
        for (i, fragment) in fragments.into_iter().enumerate() {
            if i > 0 {
                joined.push_sql(separator);
            }
            joined.append(fragment);
        }
        joined
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> &[SqlPart] {
        &self.parts
    }

    pub fn query(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                SqlPart::Sql(text) => text.as_str(),
                SqlPart::Param(_) => "?",
            })
            .collect()
    }

    pub fn params(&self) -> Vec<&SqlValue> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                SqlPart::Param(value) => Some(value),
                SqlPart::Sql(_) => None,
            })
            .collect()
    }

    pub fn to_inline_sql(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                SqlPart::Sql(text) => text.clone(),
                SqlPart::Param(value) => escape::literal(value),
            })
            .collect()
    }
}

impl From<&str> for SqlFragment {
    fn from(text: &str) -> Self {
        SqlFragment::sql(text)
    }
}

impl From<String> for SqlFragment {
    fn from(text: String) -> Self {
        SqlFragment::sql(text)
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_inline_sql())
    }
}
