//! Validation rules
//!
//! Rules are plain data: the generator produces them, the validator
//! evaluates them, and `Display` renders them in the conventional
//! `name:arg,arg` string form for clients that run their own validation.

use std::collections::BTreeMap;

use morphic_core::{AttributeId, EntityId, RecordId};
use serde::{Deserialize, Serialize, Serializer};

// ============================================================================
// Form Request
// ============================================================================

/// Operation a rule set is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormMode {
    /// A new record
    Create,
    /// Full replacement of an existing record; required fields stay required
    Replace,
    /// Partial update; every field is optional
    Patch,
}

impl FormMode {
    /// Whether required attributes must be present in this mode
    pub fn enforces_required(&self) -> bool {
        match self {
            FormMode::Create | FormMode::Replace => true,
            FormMode::Patch => false,
        }
    }

    pub fn is_update(&self) -> bool {
        match self {
            FormMode::Create => false,
            FormMode::Replace | FormMode::Patch => true,
        }
    }
}

impl std::fmt::Display for FormMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FormMode::Create => "create",
            FormMode::Replace => "replace",
            FormMode::Patch => "patch",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for FormMode {
    type Err = morphic_core::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(FormMode::Create),
            "replace" | "put" | "update" => Ok(FormMode::Replace),
            "patch" => Ok(FormMode::Patch),
            other => Err(morphic_core::EngineError::validation(format!(
                "Unknown form mode '{}'",
                other
            ))),
        }
    }
}

/// Mode plus the record being updated, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormRequest {
    pub mode: FormMode,
    pub record_id: Option<RecordId>,
}

impl FormRequest {
    pub fn create() -> Self {
        Self {
            mode: FormMode::Create,
            record_id: None,
        }
    }

    pub fn replace(record_id: RecordId) -> Self {
        Self {
            mode: FormMode::Replace,
            record_id: Some(record_id),
        }
    }

    pub fn patch(record_id: RecordId) -> Self {
        Self {
            mode: FormMode::Patch,
            record_id: Some(record_id),
        }
    }

    /// Record excluded from uniqueness checks
    pub fn ignore_record(&self) -> Option<RecordId> {
        if self.mode.is_update() {
            self.record_id
        } else {
            None
        }
    }
}

impl Default for FormRequest {
    fn default() -> Self {
        Self::create()
    }
}

// ============================================================================
// Rule
// ============================================================================

/// A single validation rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    Required,
    Nullable,
    String,
    Integer,
    Numeric,
    Date,
    Boolean,
    Array,
    /// Minimum array length, numeric value or string length
    Min(i64),
    /// Value not already stored for `(entity, attribute)`
    Unique {
        entity_id: EntityId,
        attribute_id: AttributeId,
        ignore_record: Option<RecordId>,
    },
    /// Id of an existing record of `entity_id`
    Exists { entity_id: EntityId },
}

impl Rule {
    /// Type rule for an attribute data type
    pub fn for_data_type(data_type: morphic_core::DataType) -> Self {
        use morphic_core::DataType;
        match data_type {
            DataType::String => Rule::String,
            DataType::Integer => Rule::Integer,
            DataType::Float => Rule::Numeric,
            DataType::Date => Rule::Date,
            DataType::Boolean => Rule::Boolean,
        }
    }

    /// Whether the rule concerns presence rather than the value itself
    pub fn is_presence(&self) -> bool {
        matches!(self, Rule::Required | Rule::Nullable)
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Required => write!(f, "required"),
            Rule::Nullable => write!(f, "nullable"),
            Rule::String => write!(f, "string"),
            Rule::Integer => write!(f, "integer"),
            Rule::Numeric => write!(f, "numeric"),
            Rule::Date => write!(f, "date"),
            Rule::Boolean => write!(f, "boolean"),
            Rule::Array => write!(f, "array"),
            Rule::Min(n) => write!(f, "min:{}", n),
            Rule::Unique {
                entity_id,
                attribute_id,
                ignore_record,
            } => {
                let ignore = ignore_record
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "NULL".to_string());
                write!(
                    f,
                    "unique:entity_values,value,{},record_id,entity_id,{},attribute_id,{}",
                    ignore, entity_id, attribute_id
                )
            }
            Rule::Exists { entity_id } => write!(f, "exists:records,id,entity_id,{}", entity_id),
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// ValidationRules
// ============================================================================

/// Field name to ordered rule list
///
/// Keys ending in `.*` apply to every element of the array under the
/// prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationRules(BTreeMap<String, Vec<Rule>>);

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rules of a field, replacing any existing ones
    pub fn insert(&mut self, field: impl Into<String>, rules: Vec<Rule>) {
        self.0.insert(field.into(), rules);
    }

    pub fn get(&self, field: &str) -> Option<&[Rule]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Rule>)> {
        self.0.iter()
    }

    /// Exclude `record_id` from every `unique` rule
    pub fn ignore_record(&mut self, record_id: Option<RecordId>) {
        for rule in self.0.values_mut().flatten() {
            if let Rule::Unique { ignore_record, .. } = rule {
                *ignore_record = record_id;
            }
        }
    }

    /// Rules in the `name:arg` string form, e.g. `{"title": ["required", "string"]}`
    pub fn to_strings(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(field, rules)| {
                (
                    field.clone(),
                    rules.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }
}

/// Element key for the rules applied to each item of an array field
pub fn element_key(field: &str) -> String {
    format!("{}.*", field)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_form_request_ignore_record() {
        assert_eq!(FormRequest::create().ignore_record(), None);
        assert_eq!(FormRequest::replace(5).ignore_record(), Some(5));
        assert_eq!(FormRequest::patch(6).ignore_record(), Some(6));

        // a record id on a create request is not an exclusion
        let request = FormRequest {
            mode: FormMode::Create,
            record_id: Some(9),
        };
        assert_eq!(request.ignore_record(), None);
    }

    #[test]
    fn test_mode_requiredness() {
        assert!(FormMode::Create.enforces_required());
        assert!(FormMode::Replace.enforces_required());
        assert!(!FormMode::Patch.enforces_required());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("PATCH".parse::<FormMode>().unwrap(), FormMode::Patch);
        assert_eq!("put".parse::<FormMode>().unwrap(), FormMode::Replace);
        assert!("delete".parse::<FormMode>().is_err());
    }

    #[test]
    fn test_rule_display() {
        assert_eq!(Rule::Required.to_string(), "required");
        assert_eq!(Rule::Min(0).to_string(), "min:0");
        assert_eq!(
            Rule::Exists { entity_id: 3 }.to_string(),
            "exists:records,id,entity_id,3"
        );
        assert_eq!(
            Rule::Unique {
                entity_id: 1,
                attribute_id: 2,
                ignore_record: None
            }
            .to_string(),
            "unique:entity_values,value,NULL,record_id,entity_id,1,attribute_id,2"
        );
        assert_eq!(
            Rule::Unique {
                entity_id: 1,
                attribute_id: 2,
                ignore_record: Some(8)
            }
            .to_string(),
            "unique:entity_values,value,8,record_id,entity_id,1,attribute_id,2"
        );
    }

    #[test]
    fn test_rules_serialize_as_strings() {
        let mut rules = ValidationRules::new();
        rules.insert("title", vec![Rule::Required, Rule::String]);
        rules.insert(element_key("tags"), vec![Rule::Integer]);

        assert_eq!(
            serde_json::to_value(&rules).unwrap(),
            json!({
                "tags.*": ["integer"],
                "title": ["required", "string"]
            })
        );
        assert_eq!(rules.to_strings()["title"], vec!["required", "string"]);
    }
}
