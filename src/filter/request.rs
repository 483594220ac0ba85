// Listing parameters parsed from a query string
//
// `email[lk]=gmail&name=Ana&order[desc]=name&offset=20&limit=10`

use serde_json::{Map, Value};

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::types::{FilterOrderInfo, SortDirection};
use crate::config::config;

#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    /// Public field name to a scalar (equality) or an operator map.
    pub filters: Map<String, Value>,
    pub order: Vec<FilterOrderInfo>,
    pub offset: u64,
    pub limit: u64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            filters: Map::new(),
            order: vec![],
            offset: 0,
            limit: config().query.default_limit,
        }
    }
}

impl ListParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            match key {
                "offset" => params.offset = value.trim().parse().unwrap_or(params.offset),
                "limit" => params.limit = value.trim().parse().unwrap_or(params.limit),
                // names that are not identifiers are dropped like any name outside the allow-list
                "order" => params
                    .order
                    .extend(value.split(',').flat_map(|part| FilterOrder::parse_order_string(part).unwrap_or_default())),
                _ => {
                    if let Some((field, op)) = Self::split_bracket(key) {
                        if field == "order" {
                            params.order.push(FilterOrderInfo::new(value.trim(), SortDirection::parse(op)));
                            continue;
                        }
                        let entry = params
                            .filters
                            .entry(field.to_string())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if !entry.is_object() {
                            *entry = Value::Object(Map::new());
                        }
                        if let Value::Object(ops) = entry {
                            ops.insert(op.to_string(), Value::String(value.to_string()));
                        }
                    } else if !key.is_empty() {
                        params.filters.insert(key.to_string(), Value::String(value.to_string()));
                    }
                }
            }
        }

        Ok(params)
    }

    // `field[op]` -> (field, op)
    fn split_bracket(key: &str) -> Option<(&str, &str)> {
        let inner = key.strip_suffix(']')?;
        let (field, op) = inner.split_once('[')?;
        if field.is_empty() || op.is_empty() {
            return None;
        }
        Some((field, op))
    }

    /// Filters whose public name appears in `allow`, keyed by the mapped column.
    pub fn make_filter(&self, allow: &[(&str, &str)]) -> Value {
        let mut out = Map::new();
        for (field, value) in &self.filters {
            if let Some((_, column)) = allow.iter().find(|(public, _)| public == field) {
                out.insert(column.to_string(), value.clone());
            }
        }
        Value::Object(out)
    }

    pub fn make_order(&self, allow: &[(&str, &str)]) -> Vec<FilterOrderInfo> {
        self.order
            .iter()
            .filter_map(|info| {
                allow
                    .iter()
                    .find(|(public, _)| *public == info.column)
                    .map(|(_, column)| FilterOrderInfo::new(*column, info.sort))
            })
            .collect()
    }
}
