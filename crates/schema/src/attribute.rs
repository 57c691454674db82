//! Attribute definitions
//!
//! Attributes are typed fields defined once and attached to any number of
//! entities. Their values live in `entity_values` as text and are re-typed
//! through `data_type` on read.

use morphic_core::{
    AttributeId, DataType, EngineError, EngineResult, Timestamp, UserId, Validatable,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MAX_NAME_LENGTH;
use crate::naming::{is_valid_slug, slugify};

// ============================================================================
// Attribute
// ============================================================================

/// A persisted, attachable field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Row identifier
    pub id: AttributeId,

    /// Display name, used as the form label
    pub name: String,

    /// Unique identifier, used as the record field name
    pub slug: String,

    /// Logical type of the stored values
    pub data_type: DataType,

    /// Whether a value must be present on create and full replace
    pub is_required: bool,

    /// Whether values must be unique within each entity
    pub is_unique: bool,

    /// Default value as entered by the administrator
    pub default_value: Option<String>,

    pub created_by: Option<UserId>,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl Attribute {
    /// Default value interpreted through the data type
    ///
    /// Text that does not parse as the declared type is returned verbatim.
    pub fn typed_default(&self) -> Option<Value> {
        self.default_value.as_deref().map(|text| {
            self.data_type
                .decode(text)
                .unwrap_or_else(|| Value::String(text.to_string()))
        })
    }
}

// ============================================================================
// NewAttribute
// ============================================================================

/// Input for creating an attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAttribute {
    pub name: String,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(default)]
    pub is_required: bool,

    #[serde(default)]
    pub is_unique: bool,

    #[serde(default)]
    pub default_value: Option<String>,

    #[serde(default)]
    pub created_by: Option<UserId>,
}

impl NewAttribute {
    /// Create input for an attribute of the given type
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            ..Default::default()
        }
    }

    /// Create a string attribute
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, DataType::String)
    }

    /// Create an integer attribute
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Integer)
    }

    /// Create a float attribute
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Float)
    }

    /// Create a date attribute
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Date)
    }

    /// Create a boolean attribute
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Boolean)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Mark the attribute as required
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Mark the attribute as unique per entity
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }

    /// The slug that will be stored: the explicit one, or the slugified name
    pub fn resolved_slug(&self) -> String {
        match &self.slug {
            Some(slug) if !slug.trim().is_empty() => slug.clone(),
            Some(_) | None => slugify(&self.name),
        }
    }
}

impl Validatable for NewAttribute {
    fn validate(&self) -> EngineResult<()> {
        validate_name_and_slug(&self.name, &self.resolved_slug())
    }
}

// ============================================================================
// AttributeUpdate
// ============================================================================

/// Partial update of an attribute
///
/// Changing `data_type` does not convert values already stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub is_required: Option<bool>,
    #[serde(default)]
    pub is_unique: Option<bool>,
    #[serde(default)]
    pub default_value: Option<Option<String>>,
}

impl AttributeUpdate {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.is_required = Some(required);
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.is_unique = Some(unique);
        self
    }

    pub fn with_default(mut self, value: Option<String>) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Apply the update in place and validate the result
    pub fn apply_to(&self, attribute: &mut Attribute) -> EngineResult<()> {
        if let Some(name) = &self.name {
            attribute.name = name.clone();
        }
        if let Some(slug) = &self.slug {
            attribute.slug = slug.clone();
        }
        if let Some(data_type) = self.data_type {
            attribute.data_type = data_type;
        }
        if let Some(required) = self.is_required {
            attribute.is_required = required;
        }
        if let Some(unique) = self.is_unique {
            attribute.is_unique = unique;
        }
        if let Some(default_value) = &self.default_value {
            attribute.default_value = default_value.clone();
        }
        validate_name_and_slug(&attribute.name, &attribute.slug)
    }
}

fn validate_name_and_slug(name: &str, slug: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::attribute_validation(
            name,
            "Attribute name cannot be empty",
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH || slug.chars().count() > MAX_NAME_LENGTH {
        return Err(EngineError::attribute_validation(
            name,
            format!(
                "Attribute name and slug cannot exceed {} characters",
                MAX_NAME_LENGTH
            ),
        ));
    }
    if !is_valid_slug(slug) {
        return Err(EngineError::attribute_validation(
            name,
            format!("'{}' is not a valid slug", slug),
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
