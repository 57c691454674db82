//! Field descriptors
//!
//! Descriptors tell a form renderer which inputs an entity needs. Attribute
//! fields come from attached attributes; relationship fields come from the
//! resolved relationship edges.

use morphic_core::DataType;
use morphic_schema::{Attribute, ResolvedRelationship, humanize};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// FieldType
// ============================================================================

/// Input control a field is rendered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Checkbox,
    Select,
}

impl FieldType {
    /// Input control for an attribute data type
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::String => FieldType::Text,
            DataType::Integer | DataType::Float => FieldType::Number,
            DataType::Date => FieldType::Date,
            DataType::Boolean => FieldType::Checkbox,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// FieldDescriptor
// ============================================================================

/// Form input for one attached attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Attribute slug, also the record field name
    pub name: String,

    /// Attribute display name
    pub label: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    pub required: bool,

    pub default_value: Option<Value>,
}

impl From<&Attribute> for FieldDescriptor {
    fn from(attribute: &Attribute) -> Self {
        Self {
            name: attribute.slug.clone(),
            label: attribute.name.clone(),
            field_type: FieldType::for_data_type(attribute.data_type),
            required: attribute.is_required,
            default_value: attribute.typed_default(),
        }
    }
}

// ============================================================================
// RelationshipField
// ============================================================================

/// Form input for one relationship edge touching the entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipField {
    /// Humanized field name
    pub label: String,

    /// Slug of the entity on the other end
    pub related_entity: String,

    /// Always `select`; `multiple` decides single or multi select
    pub input_type: FieldType,

    /// Orientation of the edge relative to the entity
    #[serde(flatten)]
    pub relationship: ResolvedRelationship,
}

impl RelationshipField {
    pub fn new(relationship: ResolvedRelationship, related_entity: impl Into<String>) -> Self {
        Self {
            label: humanize(&relationship.field_name),
            related_entity: related_entity.into(),
            input_type: FieldType::Select,
            relationship,
        }
    }

    /// Field name the record data uses
    pub fn name(&self) -> &str {
        &self.relationship.field_name
    }

    pub fn multiple(&self) -> bool {
        self.relationship.multiple
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use morphic_core::RelationType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_type_mapping() {
        assert_eq!(FieldType::for_data_type(DataType::String), FieldType::Text);
        assert_eq!(FieldType::for_data_type(DataType::Integer), FieldType::Number);
        assert_eq!(FieldType::for_data_type(DataType::Float), FieldType::Number);
        assert_eq!(FieldType::for_data_type(DataType::Date), FieldType::Date);
        assert_eq!(FieldType::for_data_type(DataType::Boolean), FieldType::Checkbox);
    }

    #[test]
    fn test_descriptor_from_attribute() {
        let attribute = Attribute {
            id: 1,
            name: "Stock Count".to_string(),
            slug: "stock-count".to_string(),
            data_type: DataType::Integer,
            is_required: true,
            is_unique: false,
            default_value: Some("0".to_string()),
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let field = FieldDescriptor::from(&attribute);
        assert_eq!(
            serde_json::to_value(&field).unwrap(),
            json!({
                "name": "stock-count",
                "label": "Stock Count",
                "type": "number",
                "required": true,
                "default_value": 0
            })
        );
    }

    #[test]
    fn test_relationship_field_serializes_flat() {
        let field = RelationshipField::new(
            ResolvedRelationship {
                relationship_id: 7,
                relation_type: RelationType::ManyToMany,
                is_source: true,
                field_name: "article_tags".to_string(),
                opposite_field_name: "tag_articles".to_string(),
                related_entity_id: 2,
                multiple: true,
            },
            "tag",
        );

        assert_eq!(field.label, "Article tags");
        assert_eq!(field.name(), "article_tags");
        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(value["name"], json!("article_tags"));
        assert_eq!(value["related_entity"], json!("tag"));
        assert_eq!(value["relationship_type"], json!("N:N"));
        assert_eq!(value["input_type"], json!("select"));
        assert_eq!(value["multiple"], json!(true));
        assert_eq!(value["is_source"], json!(true));
    }
}
