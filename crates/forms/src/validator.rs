//! # Rule Evaluator
//!
//! Runs a [`ValidationRules`] set against submitted record data.
//!
//! Checks that need stored data (`unique`, `exists`) go through a
//! [`RuleContext`], which the record store implements. Evaluation of a field
//! stops at its first failing rule. Blank strings, at the top level and
//! inside arrays, are read as `null` before any rule runs. On success the
//! validated subset of the input is returned: only keys that have rules are
//! kept.

use morphic_core::types::parse_date;
use morphic_core::{
    AttributeId, EngineResult, EntityId, RecordId, ValidationErrors, to_stored_text,
};
use serde_json::{Map, Value};

use crate::rules::{Rule, ValidationRules};

/// Lookups the evaluator needs from storage
pub trait RuleContext {
    /// Whether `record_id` is a record of `entity_id`
    fn record_exists(&self, entity_id: EntityId, record_id: RecordId) -> EngineResult<bool>;

    /// Whether `value` is already stored for `(entity_id, attribute_id)`,
    /// not counting `ignore_record`
    fn value_taken(
        &self,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: &str,
        ignore_record: Option<RecordId>,
    ) -> EngineResult<bool>;
}

/// Validate `data`, returning the validated subset or `ValidationFailed`
pub fn validate(
    rules: &ValidationRules,
    data: &Map<String, Value>,
    context: &dyn RuleContext,
) -> EngineResult<Map<String, Value>> {
    let data = blanks_to_null(data);
    let mut errors = ValidationErrors::new();

    for (key, field_rules) in rules.iter() {
        if let Some(prefix) = key.strip_suffix(".*") {
            // a non-array value at `prefix` is reported by the prefix's own `array` rule
            if let Some(Value::Array(items)) = data.get(prefix) {
                for (index, item) in items.iter().enumerate() {
                    let element = format!("{}.{}", prefix, index);
                    if let Some(message) = check_field(&element, Some(item), field_rules, context)? {
                        errors.add(element, message);
                    }
                }
            }
        } else if let Some(message) = check_field(key, data.get(key.as_str()), field_rules, context)? {
            errors.add(key.clone(), message);
        }
    }

    errors.into_result()?;

    let validated = rules
        .iter()
        .filter(|(key, _)| !key.ends_with(".*"))
        .filter_map(|(key, _)| data.get(key.as_str()).map(|value| (key.clone(), value.clone())))
        .collect();
    Ok(validated)
}

fn blanks_to_null(data: &Map<String, Value>) -> Map<String, Value> {
    fn normalise(value: &Value) -> Value {
        match value {
            Value::String(s) if s.trim().is_empty() => Value::Null,
            Value::Array(items) => Value::Array(items.iter().map(normalise).collect()),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Object(_) => {
                value.clone()
            }
        }
    }

    data.iter()
        .map(|(key, value)| (key.clone(), normalise(value)))
        .collect()
}

/// First failure message for one field, if any
fn check_field(
    field: &str,
    value: Option<&Value>,
    rules: &[Rule],
    context: &dyn RuleContext,
) -> EngineResult<Option<String>> {
    let label = field.replace('_', " ");
    let required = rules.contains(&Rule::Required);
    let nullable = rules.contains(&Rule::Nullable);

    let value = match value {
        None => {
            return Ok(required.then(|| format!("The {} field is required.", label)));
        }
        Some(value) => value,
    };

    if is_empty(value) {
        if required {
            return Ok(Some(format!("The {} field is required.", label)));
        }
        if nullable || !value.is_null() {
            return Ok(None);
        }
    }

    for rule in rules {
        if let Some(message) = check_rule(rule, &label, value, context)? {
            return Ok(Some(message));
        }
    }
    Ok(None)
}

fn check_rule(
    rule: &Rule,
    label: &str,
    value: &Value,
    context: &dyn RuleContext,
) -> EngineResult<Option<String>> {
    let failure = match rule {
        Rule::Required | Rule::Nullable => None,
        Rule::String => (!value.is_string()).then(|| format!("The {} field must be a string.", label)),
        Rule::Integer => as_integer(value)
            .is_none()
            .then(|| format!("The {} field must be an integer.", label)),
        Rule::Numeric => as_number(value)
            .is_none()
            .then(|| format!("The {} field must be a number.", label)),
        Rule::Date => {
            let valid = value.as_str().and_then(parse_date).is_some();
            (!valid).then(|| format!("The {} field must be a valid date.", label))
        }
        Rule::Boolean => (!is_boolean(value))
            .then(|| format!("The {} field must be true or false.", label)),
        Rule::Array => (!value.is_array()).then(|| format!("The {} field must be an array.", label)),
        Rule::Min(min) => check_min(*min, label, value),
        Rule::Unique {
            entity_id,
            attribute_id,
            ignore_record,
        } => {
            let taken = match to_stored_text(value) {
                Some(text) => context.value_taken(*entity_id, *attribute_id, &text, *ignore_record)?,
                None => false,
            };
            taken.then(|| format!("The {} has already been taken.", label))
        }
        Rule::Exists { entity_id } => {
            let exists = match as_integer(value) {
                Some(record_id) => context.record_exists(*entity_id, record_id)?,
                None => false,
            };
            (!exists).then(|| format!("The selected {} is invalid.", label))
        }
    };
    Ok(failure)
}

fn check_min(min: i64, label: &str, value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => ((items.len() as i64) < min)
            .then(|| format!("The {} field must have at least {} items.", label, min)),
        Value::String(s) if as_number(value).is_none() => ((s.chars().count() as i64) < min)
            .then(|| format!("The {} field must be at least {} characters.", label, min)),
        Value::Number(_) | Value::String(_) => as_number(value)
            .filter(|n| *n < min as f64)
            .map(|_| format!("The {} field must be at least {}.", label, min)),
        Value::Null | Value::Bool(_) | Value::Object(_) => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => false,
    }
}

/// Integral value of a number or a numeric string
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::Number(n) => matches!(n.as_i64(), Some(0 | 1)),
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::element_key;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashSet;

    const ARTICLE: EntityId = 1;
    const TAG: EntityId = 2;

    #[derive(Default)]
    struct FakeContext {
        records: HashSet<(EntityId, RecordId)>,
        values: Vec<(EntityId, AttributeId, RecordId, String)>,
    }

    impl RuleContext for FakeContext {
        fn record_exists(&self, entity_id: EntityId, record_id: RecordId) -> EngineResult<bool> {
            Ok(self.records.contains(&(entity_id, record_id)))
        }

        fn value_taken(
            &self,
            entity_id: EntityId,
            attribute_id: AttributeId,
            value: &str,
            ignore_record: Option<RecordId>,
        ) -> EngineResult<bool> {
            Ok(self.values.iter().any(|(e, a, r, v)| {
                *e == entity_id && *a == attribute_id && v == value && Some(*r) != ignore_record
            }))
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {}", other),
        }
    }

    fn article_rules() -> ValidationRules {
        let mut rules = ValidationRules::new();
        rules.insert(
            "title",
            vec![
                Rule::Required,
                Rule::String,
                Rule::Unique {
                    entity_id: ARTICLE,
                    attribute_id: 1,
                    ignore_record: None,
                },
            ],
        );
        rules.insert("price", vec![Rule::Nullable, Rule::Numeric]);
        rules.insert("published", vec![Rule::Nullable, Rule::Boolean]);
        rules.insert("published_at", vec![Rule::Nullable, Rule::Date]);
        rules.insert("stock", vec![Rule::Nullable, Rule::Integer]);
        rules.insert("tags", vec![Rule::Nullable, Rule::Array, Rule::Min(0)]);
        rules.insert(
            element_key("tags"),
            vec![Rule::Integer, Rule::Exists { entity_id: TAG }],
        );
        rules.insert(
            "owner",
            vec![Rule::Nullable, Rule::Integer, Rule::Exists { entity_id: TAG }],
        );
        rules
    }

    fn context() -> FakeContext {
        let mut context = FakeContext::default();
        context.records.insert((TAG, 5));
        context.records.insert((TAG, 6));
        context.values.push((ARTICLE, 1, 40, "Taken".to_string()));
        context
    }

    #[test]
    fn test_valid_data_returns_subset() {
        let data = object(json!({
            "title": "Hello",
            "price": "9.99",
            "published": true,
            "published_at": "2024-05-01",
            "stock": 3,
            "tags": [5, "6"],
            "owner": 5,
            "unknown": "dropped"
        }));

        let validated = validate(&article_rules(), &data, &context()).unwrap();
        assert_eq!(validated.len(), 7);
        assert!(!validated.contains_key("unknown"));
        assert_eq!(validated["tags"], json!([5, "6"]));
    }

    #[test]
    fn test_required_missing_and_empty() {
        let errors = validate(&article_rules(), &Map::new(), &context()).unwrap_err();
        let errors = errors.validation_errors().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get("title"),
            Some(&["The title field is required.".to_string()][..])
        );

        let data = object(json!({ "title": "  " }));
        assert!(validate(&article_rules(), &data, &context()).is_err());
    }

    #[test]
    fn test_nullable_fields_accept_null() {
        let data = object(json!({ "title": "Hello", "price": null, "tags": null, "owner": null }));
        let validated = validate(&article_rules(), &data, &context()).unwrap();
        assert_eq!(validated["price"], Value::Null);
    }

    #[test]
    fn test_blank_strings_read_as_null() {
        let data = object(json!({ "title": "Hello", "stock": "", "owner": " ", "tags": [] }));
        let validated = validate(&article_rules(), &data, &context()).unwrap();
        assert_eq!(validated["stock"], Value::Null);
        assert_eq!(validated["owner"], Value::Null);
        assert_eq!(validated["tags"], json!([]));

        let data = object(json!({ "title": "Hello", "tags": [5, ""] }));
        let err = validate(&article_rules(), &data, &context()).unwrap_err();
        assert_eq!(
            err.validation_errors().unwrap().get("tags.1"),
            Some(&["The tags.1 field must be an integer.".to_string()][..])
        );
    }

    #[test]
    fn test_type_failures() {
        let data = object(json!({
            "title": 12,
            "price": "cheap",
            "published": "maybe",
            "published_at": "yesterday",
            "stock": 1.5
        }));
        let err = validate(&article_rules(), &data, &context()).unwrap_err();
        let errors = err.validation_errors().unwrap();

        assert_eq!(errors.get("title").unwrap()[0], "The title field must be a string.");
        assert_eq!(errors.get("price").unwrap()[0], "The price field must be a number.");
        assert_eq!(
            errors.get("published").unwrap()[0],
            "The published field must be true or false."
        );
        assert_eq!(
            errors.get("published_at").unwrap()[0],
            "The published at field must be a valid date."
        );
        assert_eq!(errors.get("stock").unwrap()[0], "The stock field must be an integer.");
    }

    #[test]
    fn test_unique_respects_ignore_record() {
        let data = object(json!({ "title": "Taken" }));
        let err = validate(&article_rules(), &data, &context()).unwrap_err();
        assert_eq!(
            err.validation_errors().unwrap().get("title").unwrap()[0],
            "The title has already been taken."
        );

        let mut rules = ValidationRules::new();
        rules.insert(
            "title",
            vec![
                Rule::Nullable,
                Rule::String,
                Rule::Unique {
                    entity_id: ARTICLE,
                    attribute_id: 1,
                    ignore_record: Some(40),
                },
            ],
        );
        assert!(validate(&rules, &data, &context()).is_ok());
    }

    #[test]
    fn test_dangling_references() {
        let data = object(json!({ "title": "Hello", "tags": [5, 99], "owner": 77 }));
        let err = validate(&article_rules(), &data, &context()).unwrap_err();
        let errors = err.validation_errors().unwrap();

        assert!(!errors.has("tags.0"));
        assert_eq!(
            errors.get("tags.1").unwrap()[0],
            "The selected tags.1 is invalid."
        );
        assert_eq!(errors.get("owner").unwrap()[0], "The selected owner is invalid.");
    }

    #[test]
    fn test_array_rule_rejects_scalar() {
        let data = object(json!({ "title": "Hello", "tags": 5 }));
        let err = validate(&article_rules(), &data, &context()).unwrap_err();
        assert_eq!(
            err.validation_errors().unwrap().get("tags").unwrap()[0],
            "The tags field must be an array."
        );
    }

    #[test]
    fn test_min_rule() {
        let label = "count";
        assert!(check_min(2, label, &json!([1])).is_some());
        assert!(check_min(0, label, &json!([])).is_none());
        assert!(check_min(3, label, &json!(2)).is_some());
        assert!(check_min(3, label, &json!("ab")).is_some());
        assert!(check_min(3, label, &json!("abc")).is_none());
    }

    #[test]
    fn test_integer_coercions() {
        assert_eq!(as_integer(&json!(4)), Some(4));
        assert_eq!(as_integer(&json!(4.0)), Some(4));
        assert_eq!(as_integer(&json!("12")), Some(12));
        assert_eq!(as_integer(&json!("1.5")), None);
        assert_eq!(as_integer(&json!(true)), None);
    }
}
