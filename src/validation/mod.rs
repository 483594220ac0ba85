//! Declarative request validation.
//!
//! A schema is an ordered list of [`FieldSpec`]s. [`validate`] walks it once
//! per request, coercing every present value to its declared type and
//! collecting every violation before deciding; a pass either yields all
//! normalized values or fails with the complete [`ErrorSet`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

use crate::coerce;
use crate::types::RequestMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    DateTime,
    Date,
    Time,
    Bool,
    Email,
}

/// Maximum length: a character count, or `precision,scale` for floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Chars(usize),
    Decimal { precision: usize, scale: usize },
}

impl Length {
    /// `"80"` or `"10,2"`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.split_once(',') {
            Some((p, s)) => Some(Length::Decimal {
                precision: p.trim().parse().ok()?,
                scale: s.trim().parse().ok()?,
            }),
            None => raw.trim().parse().ok().map(Length::Chars),
        }
    }
}

impl std::fmt::Display for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Length::Chars(n) => write!(f, "{}", n),
            Length::Decimal { precision, scale } => write!(f, "{},{}", precision, scale),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Empty means the rule applies to every method.
    pub methods: Vec<RequestMethod>,
    pub min_length: Option<usize>,
    pub length: Option<Length>,
    pub default: Option<Value>,
    pub allowed_values: Vec<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            methods: vec![],
            min_length: None,
            length: None,
            default: None,
            allowed_values: vec![],
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn methods(mut self, methods: &[RequestMethod]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn length(mut self, max: usize) -> Self {
        self.length = Some(Length::Chars(max));
        self
    }

    pub fn decimal(mut self, precision: usize, scale: usize) -> Self {
        self.length = Some(Length::Decimal { precision, scale });
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    fn applies_to(&self, method: RequestMethod) -> bool {
        self.methods.is_empty() || self.methods.contains(&method)
    }
}

/// Field name to its violation messages, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorSet {
    entries: Vec<(String, Vec<String>)>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        match self.entries.iter_mut().find(|(name, _)| name == field) {
            Some((_, messages)) => messages.push(message.into()),
            None => self.entries.push((field.to_string(), vec![message.into()])),
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Serialize for ErrorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, messages) in &self.entries {
            map.serialize_entry(name, messages)?;
        }
        map.end()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("There are errors in the submitted fields")]
    InvalidParameters(ErrorSet),
}

/// Normalized values keyed by field name. Absent fields hold their default or null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedFields {
    values: Map<String, Value>,
}

impl ValidatedFields {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

pub fn validate(schema: &[FieldSpec], method: RequestMethod, payload: &Map<String, Value>) -> Result<ValidatedFields, ValidationError> {
    let mut errors = ErrorSet::new();
    let mut values = Map::new();

    for rule in schema {
        if !rule.applies_to(method) {
            continue;
        }

        let raw = payload.get(&rule.name).filter(|v| !is_blank(v));
        let value = match raw {
            None => {
                if rule.default.is_none() && rule.required && !method.is_partial_update() {
                    errors.add(&rule.name, "empty or missing field");
                }
                rule.default.clone().unwrap_or(Value::Null)
            }
            Some(raw) => {
                let value = coerce_field(rule, raw, &mut errors);
                check_allowed(rule, &value, &mut errors);
                value
            }
        };

        values.insert(rule.name.clone(), value);
    }

    if errors.is_empty() {
        Ok(ValidatedFields { values })
    } else {
        Err(ValidationError::InvalidParameters(errors))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

// Scalar payload values as the text the rules inspect.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn coerce_field(rule: &FieldSpec, raw: &Value, errors: &mut ErrorSet) -> Value {
    let field = rule.name.as_str();
    let Some(text) = scalar_text(raw) else {
        errors.add(field, "must be a scalar value");
        return raw.clone();
    };

    match rule.field_type {
        FieldType::String => {
            check_lengths(rule, &text, "characters", errors);
            Value::String(text)
        }
        FieldType::Integer => {
            check_lengths(rule, &text, "digits", errors);
            if !coerce::is_numeric(&text) {
                errors.add(field, "must be numeric");
                return Value::String(text);
            }
            match integer_value(&text) {
                Some(i) => Value::from(i),
                None => {
                    errors.add(field, "must be an integer");
                    Value::String(text)
                }
            }
        }
        FieldType::Float => coerce_float(rule, &text, errors),
        FieldType::DateTime => coerce_date(field, &text, coerce::normalize_datetime, "must be a date and time in ISO 8601 format", errors),
        FieldType::Date => coerce_date(field, &text, coerce::normalize_date, "must be a date in ISO 8601 format", errors),
        FieldType::Time => coerce_date(field, &text, coerce::normalize_time, "must be a time in ISO 8601 format", errors),
        FieldType::Bool => {
            let parsed = match raw {
                Value::Bool(b) => Some(*b),
                _ => coerce::parse_bool_token(&text),
            };
            match parsed {
                Some(b) => Value::Bool(b),
                None => {
                    errors.add(field, "must be a boolean");
                    Value::String(text)
                }
            }
        }
        FieldType::Email => {
            if !coerce::is_email(&text) {
                errors.add(field, "must be a valid e-mail address");
            }
            Value::String(text)
        }
    }
}

fn check_lengths(rule: &FieldSpec, text: &str, unit: &str, errors: &mut ErrorSet) {
    let count = text.chars().count();
    if let Some(min) = rule.min_length.filter(|m| *m > 0) {
        if count < min {
            errors.add(&rule.name, format!("shorter than {} {}. Received value: {}", min, unit, text));
        }
    }
    if let Some(max) = max_chars(rule.length) {
        if count > max {
            errors.add(&rule.name, format!("longer than {} {}. Received value: {}", max, unit, text));
        }
    }
}

fn max_chars(length: Option<Length>) -> Option<usize> {
    match length? {
        Length::Chars(0) => None,
        Length::Chars(n) => Some(n),
        Length::Decimal { precision, .. } => Some(precision),
    }
}

// Integers become JSON numbers; values beyond i64 fall back to floats.
/// Whole numbers only; exponent forms such as `1e3` count when they land on one.
fn integer_value(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(i);
    }
    let f = f64::from_str(trimmed).ok()?;
    if !f.is_finite() || f.fract() != 0.0 || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return None;
    }
    Some(f as i64)
}

fn coerce_float(rule: &FieldSpec, text: &str, errors: &mut ErrorSet) -> Value {
    let field = rule.name.as_str();
    let Some(normalized) = coerce::normalize_decimal(text) else {
        errors.add(field, "must be a decimal number");
        return Value::String(text.to_string());
    };

    let scale = match rule.length {
        Some(Length::Decimal { precision, scale }) => {
            if normalized.len() > precision + scale + 1 {
                errors.add(field, format!("longer than {},{}", precision, scale));
            }
            scale
        }
        Some(Length::Chars(n)) => {
            if normalized.len() > n + 1 {
                errors.add(field, format!("longer than {}", n));
            }
            0
        }
        None => 2,
    };

    match Decimal::from_str(&normalized) {
        Ok(d) => {
            let mut rounded = d.round_dp_with_strategy(scale as u32, RoundingStrategy::MidpointAwayFromZero);
            rounded.rescale(scale as u32);
            Value::String(rounded.to_string())
        }
        // Digits beyond Decimal's range; the normalized text is already fixed-scale
        Err(_) => Value::String(normalized),
    }
}

fn coerce_date(field: &str, text: &str, normalize: fn(&str) -> Option<String>, message: &str, errors: &mut ErrorSet) -> Value {
    match normalize(text) {
        Some(normalized) => Value::String(normalized),
        None => {
            errors.add(field, message);
            Value::String(text.to_string())
        }
    }
}

fn check_allowed(rule: &FieldSpec, value: &Value, errors: &mut ErrorSet) {
    if rule.allowed_values.is_empty() {
        return;
    }
    let actual = scalar_text(value);
    let allowed: Vec<String> = rule.allowed_values.iter().filter_map(scalar_text).collect();
    if actual.map(|a| allowed.contains(&a)).unwrap_or(false) {
        return;
    }
    errors.add(
        &rule.name,
        format!("unexpected value. Expected values are: {}", allowed.join(", ")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn errors_of(result: Result<ValidatedFields, ValidationError>) -> ErrorSet {
        match result {
            Err(ValidationError::InvalidParameters(errors)) => errors,
            Ok(values) => panic!("expected errors, got {:?}", values),
        }
    }

    fn user_schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("email", FieldType::Email).required().length(80),
            FieldSpec::new("name", FieldType::String).required().min_length(2).length(80),
            FieldSpec::new("password", FieldType::String).required().length(80),
        ]
    }

    #[test]
    fn required_field_missing_on_post() {
        let schema = vec![FieldSpec::new("email", FieldType::Email).required()];
        let errors = errors_of(validate(&schema, RequestMethod::Post, &Map::new()));
        assert_eq!(errors.get("email"), Some(&["empty or missing field".to_string()][..]));
    }

    #[test]
    fn put_is_partial() {
        let values = validate(&user_schema(), RequestMethod::Put, &map(json!({"name": "Ana"}))).unwrap();
        assert_eq!(values.get_str("name"), Some("Ana"));
        assert_eq!(values.get("email"), None);
        assert_eq!(values.as_map().get("email"), Some(&Value::Null));
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let errors = errors_of(validate(&user_schema(), RequestMethod::Post, &map(json!({
            "email": "  ",
            "name": null,
            "password": "secret"
        }))));
        assert_eq!(errors.len(), 2);
        assert!(errors.get("password").is_none());
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let schema = vec![FieldSpec::new("unit", FieldType::String).required().default_value("ml")];
        let values = validate(&schema, RequestMethod::Post, &Map::new()).unwrap();
        assert_eq!(values.get_str("unit"), Some("ml"));
    }

    #[test]
    fn method_scoping_skips_fields() {
        let schema = vec![FieldSpec::new("token", FieldType::String).required().methods(&[RequestMethod::Patch])];
        let values = validate(&schema, RequestMethod::Post, &Map::new()).unwrap();
        assert!(values.as_map().is_empty());
    }

    #[test]
    fn string_length_messages() {
        let errors = errors_of(validate(&user_schema(), RequestMethod::Post, &map(json!({
            "email": "ana@mail.com",
            "name": "A",
            "password": "x".repeat(81)
        }))));
        assert_eq!(errors.get("name"), Some(&["shorter than 2 characters. Received value: A".to_string()][..]));
        assert_eq!(errors.get("password").map(|m| m.len()), Some(1));
        assert!(errors.get("password").unwrap()[0].starts_with("longer than 80 characters."));
    }

    #[test]
    fn integers_are_numeric_and_stored_as_numbers() {
        let schema = vec![FieldSpec::new("drink_ml", FieldType::Integer).required().length(4)];
        let values = validate(&schema, RequestMethod::Post, &map(json!({"drink_ml": "250"}))).unwrap();
        assert_eq!(values.get_i64("drink_ml"), Some(250));

        let values = validate(&schema, RequestMethod::Post, &map(json!({"drink_ml": 300}))).unwrap();
        assert_eq!(values.get("drink_ml"), Some(&json!(300)));

        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"drink_ml": "12abc"}))));
        assert_eq!(
            errors.get("drink_ml"),
            Some(&[
                "longer than 4 digits. Received value: 12abc".to_string(),
                "must be numeric".to_string()
            ][..])
        );
    }

    #[test]
    fn integers_reject_fractions() {
        let schema = vec![FieldSpec::new("drink_ml", FieldType::Integer).required()];

        for raw in [json!("250.5"), json!(250.5)] {
            let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"drink_ml": raw}))));
            assert_eq!(errors.get("drink_ml"), Some(&["must be an integer".to_string()][..]));
        }

        let values = validate(&schema, RequestMethod::Post, &map(json!({"drink_ml": "1e3"}))).unwrap();
        assert_eq!(values.get_i64("drink_ml"), Some(1000));

        let values = validate(&schema, RequestMethod::Post, &map(json!({"drink_ml": "250.0"}))).unwrap();
        assert_eq!(values.get_i64("drink_ml"), Some(250));

        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"drink_ml": "1e30"}))));
        assert_eq!(errors.get("drink_ml"), Some(&["must be an integer".to_string()][..]));
    }

    #[test]
    fn float_precision_and_scale() {
        let schema = vec![FieldSpec::new("amount", FieldType::Float).decimal(6, 2)];

        let values = validate(&schema, RequestMethod::Post, &map(json!({"amount": "1234"}))).unwrap();
        assert_eq!(values.get_str("amount"), Some("1234.00"));

        let values = validate(&schema, RequestMethod::Post, &map(json!({"amount": "R$ 1.234,56"}))).unwrap();
        assert_eq!(values.get_str("amount"), Some("1234.56"));

        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"amount": "1234567"}))));
        assert_eq!(errors.get("amount"), Some(&["longer than 6,2".to_string()][..]));

        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"amount": "abc"}))));
        assert_eq!(errors.get("amount"), Some(&["must be a decimal number".to_string()][..]));
    }

    #[test]
    fn float_scale_rounds() {
        let schema = vec![FieldSpec::new("liters", FieldType::Float).decimal(4, 1)];
        let values = validate(&schema, RequestMethod::Post, &map(json!({"liters": "2,25"}))).unwrap();
        assert_eq!(values.get_str("liters"), Some("2.3"));
    }

    #[test]
    fn dates_are_normalized() {
        let schema = vec![
            FieldSpec::new("at", FieldType::DateTime),
            FieldSpec::new("day", FieldType::Date),
            FieldSpec::new("hour", FieldType::Time),
        ];
        let values = validate(&schema, RequestMethod::Post, &map(json!({
            "at": "2024-01-02T03:04:05",
            "day": "2024/01/02",
            "hour": "14:15"
        })))
        .unwrap();
        assert_eq!(values.get_str("at"), Some("2024-01-02 03:04:05"));
        assert_eq!(values.get_str("day"), Some("2024-01-02"));
        assert_eq!(values.get_str("hour"), Some("14:15:00"));

        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"day": "not a day"}))));
        assert_eq!(errors.get("day"), Some(&["must be a date in ISO 8601 format".to_string()][..]));
    }

    #[test]
    fn booleans_accept_tokens_and_json() {
        let schema = vec![FieldSpec::new("active", FieldType::Bool)];
        for (raw, expected) in [(json!("S"), true), (json!("n"), false), (json!(true), true), (json!(0), false)] {
            let values = validate(&schema, RequestMethod::Post, &map(json!({"active": raw}))).unwrap();
            assert_eq!(values.get_bool("active"), Some(expected));
        }
        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"active": "maybe"}))));
        assert_eq!(errors.get("active"), Some(&["must be a boolean".to_string()][..]));
    }

    #[test]
    fn email_shape() {
        let schema = vec![FieldSpec::new("email", FieldType::Email)];
        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"email": "ana@"}))));
        assert_eq!(errors.get("email"), Some(&["must be a valid e-mail address".to_string()][..]));
    }

    #[test]
    fn allowed_values_are_enumerated() {
        let schema = vec![FieldSpec::new("kind", FieldType::String).allowed(["a", "b"])];
        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"kind": "teste"}))));
        assert_eq!(
            errors.get("kind"),
            Some(&["unexpected value. Expected values are: a, b".to_string()][..])
        );
        assert!(validate(&schema, RequestMethod::Post, &map(json!({"kind": "b"}))).is_ok());
        // absent values are not checked
        assert!(validate(&schema, RequestMethod::Post, &Map::new()).is_ok());
    }

    #[test]
    fn structured_values_are_rejected() {
        let schema = vec![FieldSpec::new("name", FieldType::String)];
        let errors = errors_of(validate(&schema, RequestMethod::Post, &map(json!({"name": ["x"]}))));
        assert_eq!(errors.get("name"), Some(&["must be a scalar value".to_string()][..]));
    }

    #[test]
    fn validation_is_deterministic() {
        let payload = map(json!({"email": "bad", "name": "Ana"}));
        let first = validate(&user_schema(), RequestMethod::Post, &payload);
        let second = validate(&user_schema(), RequestMethod::Post, &payload);
        assert_eq!(first, second);
    }

    #[test]
    fn error_set_serializes_in_schema_order() {
        let errors = errors_of(validate(&user_schema(), RequestMethod::Post, &Map::new()));
        let json = serde_json::to_string(&errors).unwrap();
        assert_eq!(
            json,
            r#"{"email":["empty or missing field"],"name":["empty or missing field"],"password":["empty or missing field"]}"#
        );
    }

    #[test]
    fn parses_length_declarations() {
        assert_eq!(Length::parse("80"), Some(Length::Chars(80)));
        assert_eq!(Length::parse("10, 2"), Some(Length::Decimal { precision: 10, scale: 2 }));
        assert_eq!(Length::parse("x"), None);
        assert_eq!(Length::Decimal { precision: 6, scale: 2 }.to_string(), "6,2");
    }
}
