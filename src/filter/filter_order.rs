use serde_json::Value;

use super::error::FilterError;
use super::escape;
use super::types::{FilterOrderInfo, OrderEntry, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Parses `"name desc, email"`, `["name desc", "email"]` or
    /// `{"name": "desc", "email": "asc"}` into validated column orderings.
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                let mut out = Vec::new();
                for v in arr {
                    if let Value::String(s) = v { out.extend(Self::parse_order_string(s)?); }
                }
                Ok(out)
            }
            Value::Object(obj) => {
                let mut out = Vec::new();
                for (k, v) in obj {
                    let column = escape::validate_identifier(k)?;
                    out.push(FilterOrderInfo::new(column, SortDirection::parse(v.as_str().unwrap_or("asc"))));
                }
                Ok(out)
            }
            _ => Ok(vec![]),
        }
    }

    pub fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let column = escape::validate_identifier(col)?;
                let sort = SortDirection::parse(it.next().unwrap_or("asc"));
                out.push(FilterOrderInfo::new(column, sort));
            }
        }
        Ok(out)
    }

    pub fn generate(entries: &[OrderEntry]) -> String {
        if entries.is_empty() { return String::new(); }
        let parts: Vec<String> = entries
            .iter()
            .map(|entry| match entry {
                OrderEntry::Raw(expr) => expr.clone(),
                OrderEntry::Column(info) => format!("{} {}", info.column, info.sort.to_sql()),
            })
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_array_and_object_forms() {
        let from_string = FilterOrder::validate_and_parse(&json!("name desc, email")).unwrap();
        assert_eq!(
            from_string,
            vec![
                FilterOrderInfo::new("name", SortDirection::Desc),
                FilterOrderInfo::new("email", SortDirection::Asc),
            ]
        );

        let from_array = FilterOrder::validate_and_parse(&json!(["drink_at DESC"])).unwrap();
        assert_eq!(from_array, vec![FilterOrderInfo::new("drink_at", SortDirection::Desc)]);

        let from_object = FilterOrder::validate_and_parse(&json!({"user.name": "asc"})).unwrap();
        assert_eq!(from_object, vec![FilterOrderInfo::new("user.name", SortDirection::Asc)]);
    }

    #[test]
    fn rejects_invalid_columns() {
        assert!(FilterOrder::parse_order_string("name;--").is_err());
    }

    #[test]
    fn generates_order_by() {
        assert_eq!(FilterOrder::generate(&[]), "");
        let sql = FilterOrder::generate(&[
            OrderEntry::Raw("count(drink.id_drink) DESC".to_string()),
            OrderEntry::Column(FilterOrderInfo::new("name", SortDirection::Asc)),
        ]);
        assert_eq!(sql, "ORDER BY count(drink.id_drink) DESC, name ASC");
    }
}
