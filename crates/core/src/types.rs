//! Core types used throughout Morphic
//!
//! This module contains the fundamental types that form the foundation
//! of the dynamic schema: row identifiers, the closed set of attribute
//! data types and the closed set of relationship cardinalities.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::EngineError;

// ============================================================================
// Unique Identifiers
// ============================================================================

/// Identifier of an entity (content type) row
pub type EntityId = i64;

/// Identifier of an attribute row
pub type AttributeId = i64;

/// Identifier of an entity relationship definition
pub type RelationshipId = i64;

/// Identifier of a record row
pub type RecordId = i64;

/// Identifier of the acting user, supplied by the caller
pub type UserId = i64;

/// Timestamp type used on every timestamped row
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// Data Types
// ============================================================================

/// Data types an attribute can declare
///
/// Values are always persisted as text; the data type decides how that text
/// is interpreted when a record is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Free-form text
    String,
    /// Whole number
    Integer,
    /// Floating point number
    Float,
    /// Calendar date (optionally with a time component)
    Date,
    /// True/false flag
    Boolean,
}

impl DataType {
    /// Storage name of the data type
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Date => "date",
            DataType::Boolean => "boolean",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            DataType::String => "String",
            DataType::Integer => "Integer",
            DataType::Float => "Float",
            DataType::Date => "Date",
            DataType::Boolean => "Boolean",
        }
    }

    /// Get all data types
    pub fn all() -> &'static [DataType] {
        &[
            DataType::String,
            DataType::Integer,
            DataType::Float,
            DataType::Date,
            DataType::Boolean,
        ]
    }

    /// Re-type stored text into its logical JSON value.
    ///
    /// Returns `None` when the text cannot be read as this data type; callers
    /// decide whether to fall back to the raw string.
    pub fn decode(&self, text: &str) -> Option<Value> {
        match self {
            DataType::String => Some(Value::String(text.to_string())),
            DataType::Integer => decode_integer(text).map(Value::from),
            DataType::Float => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            DataType::Date => parse_date(text).map(|_| Value::String(text.to_string())),
            DataType::Boolean => parse_bool(text).map(Value::Bool),
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::String
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(DataType::String),
            "integer" => Ok(DataType::Integer),
            "float" => Ok(DataType::Float),
            "date" => Ok(DataType::Date),
            "boolean" => Ok(DataType::Boolean),
            other => Err(EngineError::validation(format!(
                "Unknown data type '{}'",
                other
            ))),
        }
    }
}

fn decode_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    // "12.0" is an integral number written by a float-producing client
    let f = text.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a date in one of the accepted textual forms
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(datetime.date());
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

/// Parse the loose boolean spellings accepted on input and found in storage
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Render a submitted JSON value to the text stored in `entity_values.value`.
///
/// No coercion by data type happens here: strings are stored verbatim,
/// numbers in their JSON spelling, booleans as `1`/`0`, null as NULL and
/// composite values as compact JSON.
pub fn to_stored_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

// ============================================================================
// Relationship Types
// ============================================================================

/// Entity relationship cardinalities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    /// One record relates to exactly one other record
    #[serde(rename = "1:1")]
    OneToOne,
    /// One source record relates to many target records
    #[serde(rename = "1:N")]
    OneToMany,
    /// Many records on either side relate to many on the other
    #[serde(rename = "N:N")]
    ManyToMany,
}

impl RelationType {
    /// Storage code of the relationship type
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::OneToOne => "1:1",
            RelationType::OneToMany => "1:N",
            RelationType::ManyToMany => "N:N",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            RelationType::OneToOne => "One to One",
            RelationType::OneToMany => "One to Many",
            RelationType::ManyToMany => "Many to Many",
        }
    }

    /// Get arrow symbol for visual representation
    pub fn arrow_symbol(&self) -> &'static str {
        match self {
            RelationType::OneToOne => "1 ─── 1",
            RelationType::OneToMany => "1 ───< *",
            RelationType::ManyToMany => "* >──< *",
        }
    }

    /// Whether the field on the given side accepts several record ids
    ///
    /// One-to-many is multiple on the source ("many") side and single on the
    /// target ("one") side.
    pub fn is_multiple(&self, is_source: bool) -> bool {
        match self {
            RelationType::OneToOne => false,
            RelationType::OneToMany => is_source,
            RelationType::ManyToMany => true,
        }
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationType] {
        &[
            RelationType::OneToOne,
            RelationType::OneToMany,
            RelationType::ManyToMany,
        ]
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "1:1" | "one-to-one" => Ok(RelationType::OneToOne),
            "1:n" | "one-to-many" => Ok(RelationType::OneToMany),
            "n:n" | "many-to-many" => Ok(RelationType::ManyToMany),
            other => Err(EngineError::validation(format!(
                "Unknown relationship type '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    // DataType tests
    #[test]
    fn test_data_type_parse() {
        assert_eq!("string".parse::<DataType>().unwrap(), DataType::String);
        assert_eq!("Boolean".parse::<DataType>().unwrap(), DataType::Boolean);
        assert!("money".parse::<DataType>().unwrap_err().is_validation());
    }

    #[test]
    fn test_data_type_serde_names() {
        assert_eq!(serde_json::to_value(DataType::Float).unwrap(), json!("float"));
        let parsed: DataType = serde_json::from_value(json!("date")).unwrap();
        assert_eq!(parsed, DataType::Date);
    }

    #[test]
    fn test_decode_integer() {
        assert_eq!(DataType::Integer.decode("42"), Some(json!(42)));
        assert_eq!(DataType::Integer.decode("12.0"), Some(json!(12)));
        assert_eq!(DataType::Integer.decode("twelve"), None);
    }

    #[test]
    fn test_decode_float() {
        assert_eq!(DataType::Float.decode("9.5"), Some(json!(9.5)));
        assert_eq!(DataType::Float.decode("NaN"), None);
    }

    #[test]
    fn test_decode_boolean() {
        assert_eq!(DataType::Boolean.decode("1"), Some(json!(true)));
        assert_eq!(DataType::Boolean.decode("0"), Some(json!(false)));
        assert_eq!(DataType::Boolean.decode("true"), Some(json!(true)));
        assert_eq!(DataType::Boolean.decode("maybe"), None);
    }

    #[test]
    fn test_decode_date_keeps_text() {
        assert_eq!(
            DataType::Date.decode("2024-03-01"),
            Some(json!("2024-03-01"))
        );
        assert_eq!(
            DataType::Date.decode("2024-03-01T10:00:00Z"),
            Some(json!("2024-03-01T10:00:00Z"))
        );
        assert_eq!(DataType::Date.decode("yesterday"), None);
    }

    #[test]
    fn test_decode_string_is_verbatim() {
        assert_eq!(DataType::String.decode(" 42 "), Some(json!(" 42 ")));
    }

    #[test]
    fn test_stored_text() {
        assert_eq!(to_stored_text(&json!("X")), Some("X".to_string()));
        assert_eq!(to_stored_text(&json!(7)), Some("7".to_string()));
        assert_eq!(to_stored_text(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(to_stored_text(&json!(true)), Some("1".to_string()));
        assert_eq!(to_stored_text(&json!(false)), Some("0".to_string()));
        assert_eq!(to_stored_text(&Value::Null), None);
        assert_eq!(to_stored_text(&json!([1, 2])), Some("[1,2]".to_string()));
    }

    // RelationType tests
    #[test]
    fn test_relation_type_codes() {
        assert_eq!(RelationType::OneToOne.as_str(), "1:1");
        assert_eq!(RelationType::OneToMany.arrow_symbol(), "1 ───< *");
        assert_eq!(
            serde_json::to_value(RelationType::ManyToMany).unwrap(),
            json!("N:N")
        );
    }

    #[test]
    fn test_relation_type_parse() {
        assert_eq!(
            "one-to-many".parse::<RelationType>().unwrap(),
            RelationType::OneToMany
        );
        assert_eq!(
            "many_to_many".parse::<RelationType>().unwrap(),
            RelationType::ManyToMany
        );
        assert_eq!("1:1".parse::<RelationType>().unwrap(), RelationType::OneToOne);
        assert!("1:2".parse::<RelationType>().is_err());
    }

    #[test]
    fn test_relation_type_multiplicity() {
        assert!(!RelationType::OneToOne.is_multiple(true));
        assert!(!RelationType::OneToOne.is_multiple(false));
        assert!(RelationType::OneToMany.is_multiple(true));
        assert!(!RelationType::OneToMany.is_multiple(false));
        assert!(RelationType::ManyToMany.is_multiple(true));
        assert!(RelationType::ManyToMany.is_multiple(false));
    }
}
