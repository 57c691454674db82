//! Error types for Morphic
//!
//! This module provides unified error handling across the engine,
//! including not-found errors, validation failures, storage errors and more.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Morphic
#[derive(Debug, Error)]
pub enum EngineError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// General validation error (malformed input, not a rule failure)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Submitted record data was rejected by the generated rules
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationErrors),

    /// Entity definition is invalid
    #[error("Entity validation failed for '{entity}': {message}")]
    EntityValidation { entity: String, message: String },

    /// Attribute definition is invalid
    #[error("Attribute validation failed for '{attribute}': {message}")]
    AttributeValidation { attribute: String, message: String },

    /// Relationship definition is invalid
    #[error("Relationship validation failed: {0}")]
    RelationshipValidation(String),

    // ========================================================================
    // Not Found Errors
    // ========================================================================
    /// Entity not found by id
    #[error("Entity not found: {0}")]
    EntityNotFound(i64),

    /// Entity not found by slug
    #[error("Entity with slug '{0}' not found")]
    EntitySlugNotFound(String),

    /// Attribute not found
    #[error("Attribute not found: {0}")]
    AttributeNotFound(i64),

    /// Attribute not found by slug
    #[error("Attribute with slug '{0}' not found")]
    AttributeSlugNotFound(String),

    /// Relationship not found
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(i64),

    /// Record not found within an entity
    #[error("Record {record_id} not found in entity '{entity}'")]
    RecordNotFound { entity: String, record_id: i64 },

    // ========================================================================
    // Conflict Errors
    // ========================================================================
    /// Slug already taken in its table
    #[error("Duplicate slug: '{slug}' already exists in {table}")]
    DuplicateSlug { table: String, slug: String },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Underlying database error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A transaction could not be committed and was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ========================================================================
    // IO Errors
    // ========================================================================
    /// File IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File read error
    #[error("Failed to read file '{path}': {message}")]
    FileRead { path: PathBuf, message: String },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Create an entity validation error
    pub fn entity_validation(entity: impl Into<String>, msg: impl Into<String>) -> Self {
        EngineError::EntityValidation {
            entity: entity.into(),
            message: msg.into(),
        }
    }

    /// Create an attribute validation error
    pub fn attribute_validation(attribute: impl Into<String>, msg: impl Into<String>) -> Self {
        EngineError::AttributeValidation {
            attribute: attribute.into(),
            message: msg.into(),
        }
    }

    /// Create a record-not-found error
    pub fn record_not_found(entity: impl Into<String>, record_id: i64) -> Self {
        EngineError::RecordNotFound {
            entity: entity.into(),
            record_id,
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::ValidationFailed(_)
                | EngineError::EntityValidation { .. }
                | EngineError::AttributeValidation { .. }
                | EngineError::RelationshipValidation(_)
        )
    }

    /// Check if this error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::EntityNotFound(_)
                | EngineError::EntitySlugNotFound(_)
                | EngineError::AttributeNotFound(_)
                | EngineError::AttributeSlugNotFound(_)
                | EngineError::RelationshipNotFound(_)
                | EngineError::RecordNotFound { .. }
        )
    }

    /// Check if this error came from the storage layer
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            EngineError::Storage(_) | EngineError::Transaction(_)
        )
    }

    /// Field-level messages when this is a rule failure
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        if let EngineError::ValidationFailed(errors) = self {
            Some(errors)
        } else {
            None
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

/// Result type alias using EngineError
pub type EngineResult<T> = Result<T, EngineError>;

// ============================================================================
// ValidationErrors
// ============================================================================

/// Field name to messages mapping produced by rule evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    /// Create an empty error set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Messages recorded for a field
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Whether a field has any message
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with errors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over `(field, messages)` pairs in field order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Convert into `Ok(())` when empty, `ValidationFailed` otherwise
    pub fn into_result(self) -> EngineResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ValidationFailed(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validation_error() {
        let err = EngineError::validation("Unknown data type 'money'");
        assert!(err.is_validation());
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Validation error: Unknown data type 'money'"
        );
    }

    #[test]
    fn test_entity_validation_error() {
        let err = EngineError::entity_validation("Article", "Name cannot be empty");
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Entity validation failed for 'Article': Name cannot be empty"
        );
    }

    #[test]
    fn test_not_found_errors() {
        let err = EngineError::EntitySlugNotFound("invalid-slug".to_string());
        assert!(err.is_not_found());
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "Entity with slug 'invalid-slug' not found");

        let err = EngineError::record_not_found("article", 42);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Record 42 not found in entity 'article'");
    }

    #[test]
    fn test_validation_failed_carries_field_messages() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "The title field is required.");
        errors.add("tags.1", "The selected tags.1 is invalid.");

        let err = EngineError::ValidationFailed(errors);
        assert!(err.is_validation());

        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.has("title"));
        assert_eq!(
            errors.get("title"),
            Some(&["The title field is required.".to_string()][..])
        );
    }

    #[test]
    fn test_empty_validation_errors_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.add("price", "The price field must be a number.");
        assert!(errors.into_result().unwrap_err().is_validation());
    }

    #[test]
    fn test_validation_errors_serialize_as_map() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "The title field is required.");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "title": ["The title field is required."] })
        );
    }

    #[test]
    fn test_storage_error_classification() {
        let err: EngineError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.is_storage());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_duplicate_slug() {
        let err = EngineError::DuplicateSlug {
            table: "entities".to_string(),
            slug: "article".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate slug: 'article' already exists in entities"
        );
    }
}
