use serde_json::{Map, Value};

use super::error::FilterError;
use super::escape;
use super::types::{FilterOp, SqlFragment, SqlValue};

/// Translates filter conditions into WHERE predicates.
///
/// Accepted shapes: a raw clause string, or an object whose entries are
/// `field: scalar` (equality), `"field !=": scalar` (not-equal), or
/// `field: {op: value, ...}` (bracket operators).
pub struct FilterWhere;

impl FilterWhere {
    pub fn generate(conditions: &Value) -> Result<Vec<SqlFragment>, FilterError> {
        match conditions {
            Value::Null => Ok(vec![]),
            Value::String(raw) => {
                if raw.trim().is_empty() { return Ok(vec![]); }
                // Raw predicate text comes from code, never from the request
                Ok(vec![SqlFragment::sql(raw.trim())])
            }
            Value::Object(obj) => Self::generate_map(obj),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be object or string".to_string())),
        }
    }

    pub fn generate_map(obj: &Map<String, Value>) -> Result<Vec<SqlFragment>, FilterError> {
        let mut out = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            out.extend(Self::parse_entry(key, value)?);
        }
        Ok(out)
    }

    fn parse_entry(key: &str, value: &Value) -> Result<Vec<SqlFragment>, FilterError> {
        match value {
            Value::Object(ops) => {
                if ops.is_empty() {
                    return Err(FilterError::InvalidOperatorData(format!("no operator given for '{}'", key)));
                }
                ops.iter().map(|(op_key, op_val)| Self::build(key, op_key, op_val)).collect()
            }
            Value::Array(_) => Err(FilterError::InvalidOperatorData(format!("'{}' does not accept a list", key))),
            _ => {
                let trimmed = key.trim_end();
                if let Some(field) = trimmed.strip_suffix("!=") {
                    Ok(vec![Self::build_op(field.trim_end(), FilterOp::Neq, value)?])
                } else {
                    Ok(vec![Self::build_op(key, FilterOp::Eq, value)?])
                }
            }
        }
    }

    /// One predicate for `field <op> value`, resolving `op_key` first.
    pub fn build(field: &str, op_key: &str, raw: &Value) -> Result<SqlFragment, FilterError> {
        let op = FilterOp::from_key(op_key)?;
        Self::build_op(field, op, raw)
    }

    pub fn build_op(field: &str, op: FilterOp, raw: &Value) -> Result<SqlFragment, FilterError> {
        let column = escape::validate_identifier(field)?;
        let mut fragment = SqlFragment::sql(format!("{} {} ", column, op.to_sql()));

        if let Some(text) = Self::pattern_source(raw) {
            if let Some(pattern) = op.pattern(&text?) {
                fragment.push_param(SqlValue::Text(pattern));
                return Ok(fragment);
            }
        }

        match raw {
            Value::Null => match op {
                FilterOp::Eq => Ok(SqlFragment::sql(format!("{} IS NULL", column))),
                FilterOp::Neq => Ok(SqlFragment::sql(format!("{} IS NOT NULL", column))),
                _ => Err(FilterError::InvalidOperatorData(format!("'{}' cannot compare against null", column))),
            },
            Value::String(s) => {
                match escape::keyword(s) {
                    Some(keyword) => { fragment.push_sql(keyword); }
                    None => { fragment.push_param(SqlValue::Text(s.clone())); }
                }
                Ok(fragment)
            }
            Value::Bool(_) | Value::Number(_) => {
                fragment.push_param(SqlValue::from(raw));
                Ok(fragment)
            }
            Value::Array(_) | Value::Object(_) => {
                Err(FilterError::InvalidOperatorData(format!("'{}' expects a scalar value", column)))
            }
        }
    }

    // Text that feeds a LIKE pattern; None leaves the value to the comparison path.
    fn pattern_source(raw: &Value) -> Option<Result<String, FilterError>> {
        match raw {
            Value::String(s) => Some(Ok(s.clone())),
            Value::Number(n) => Some(Ok(n.to_string())),
            Value::Bool(b) => Some(Ok(b.to_string())),
            Value::Null => None,
            Value::Array(_) | Value::Object(_) => {
                Some(Err(FilterError::InvalidOperatorData("pattern operators expect a scalar value".to_string())))
            }
        }
    }
}
