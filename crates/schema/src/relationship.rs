//! Relationship definitions between entities
//!
//! An `EntityRelationship` is a directed, typed edge definition. The source
//! entity sees the edge under `name`; the target entity sees it under
//! `inverse_name`. Concrete record-to-record edges are `RecordRelationship`
//! rows that point back at the definition.

use morphic_core::{EngineError, EngineResult, EntityId, RelationType, RelationshipId, Validatable};
use serde::{Deserialize, Serialize};

use crate::MAX_RELATIONSHIP_NAME_LENGTH;
use crate::naming::relationship_names;

// ============================================================================
// EntityRelationship
// ============================================================================

/// A persisted relationship definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub id: RelationshipId,

    /// Cardinality of the edge
    #[serde(rename = "type")]
    pub relation_type: RelationType,

    /// Field name on the source entity
    pub name: String,

    /// Field name on the target entity
    pub inverse_name: String,

    pub from_entity_id: EntityId,

    pub to_entity_id: EntityId,
}

impl EntityRelationship {
    /// Whether the edge has the given entity at either end
    pub fn touches(&self, entity_id: EntityId) -> bool {
        self.from_entity_id == entity_id || self.to_entity_id == entity_id
    }

    /// Whether both ends are the same entity
    pub fn is_self_referencing(&self) -> bool {
        self.from_entity_id == self.to_entity_id
    }

    /// The entities whose cached schema depends on this edge
    pub fn endpoints(&self) -> [EntityId; 2] {
        [self.from_entity_id, self.to_entity_id]
    }
}

// ============================================================================
// NewRelationship
// ============================================================================

/// Input for creating a relationship
///
/// Omitted field names are derived from the entity slugs with
/// [`NewRelationship::resolve_names`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelationship {
    #[serde(rename = "type")]
    pub relation_type: RelationType,

    pub from_entity_id: EntityId,

    pub to_entity_id: EntityId,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub inverse_name: Option<String>,
}

impl NewRelationship {
    pub fn new(relation_type: RelationType, from_entity_id: EntityId, to_entity_id: EntityId) -> Self {
        Self {
            relation_type,
            from_entity_id,
            to_entity_id,
            name: None,
            inverse_name: None,
        }
    }

    /// Create a one-to-one relationship
    pub fn one_to_one(from_entity_id: EntityId, to_entity_id: EntityId) -> Self {
        Self::new(RelationType::OneToOne, from_entity_id, to_entity_id)
    }

    /// Create a one-to-many relationship
    pub fn one_to_many(from_entity_id: EntityId, to_entity_id: EntityId) -> Self {
        Self::new(RelationType::OneToMany, from_entity_id, to_entity_id)
    }

    /// Create a many-to-many relationship
    pub fn many_to_many(from_entity_id: EntityId, to_entity_id: EntityId) -> Self {
        Self::new(RelationType::ManyToMany, from_entity_id, to_entity_id)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_inverse_name(mut self, inverse_name: impl Into<String>) -> Self {
        self.inverse_name = Some(inverse_name.into());
        self
    }

    /// Fill in omitted field names from the endpoint slugs
    ///
    /// Names the caller supplied are kept; only the missing ones are derived.
    pub fn resolve_names(mut self, from_slug: &str, to_slug: &str) -> Self {
        let (name, inverse_name) = relationship_names(self.relation_type, from_slug, to_slug);
        if self.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
            self.name = Some(name);
        }
        if self.inverse_name.as_deref().is_none_or(|n| n.trim().is_empty()) {
            self.inverse_name = Some(inverse_name);
        }
        self
    }

    /// Build the persisted form, once names are resolved
    pub fn into_relationship(self, id: RelationshipId) -> EngineResult<EntityRelationship> {
        self.validate()?;
        Ok(EntityRelationship {
            id,
            relation_type: self.relation_type,
            name: self.name.unwrap_or_default(),
            inverse_name: self.inverse_name.unwrap_or_default(),
            from_entity_id: self.from_entity_id,
            to_entity_id: self.to_entity_id,
        })
    }
}

impl Validatable for NewRelationship {
    fn validate(&self) -> EngineResult<()> {
        let name = self.name.as_deref().unwrap_or_default();
        let inverse_name = self.inverse_name.as_deref().unwrap_or_default();

        validate_field_name("name", name)?;
        validate_field_name("inverse name", inverse_name)?;

        if self.from_entity_id == self.to_entity_id && name == inverse_name {
            return Err(EngineError::RelationshipValidation(format!(
                "A self-referencing relationship needs distinct names, got '{}' twice",
                name
            )));
        }
        Ok(())
    }
}

fn validate_field_name(what: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::RelationshipValidation(format!(
            "Relationship {} cannot be empty",
            what
        )));
    }
    if value.chars().count() > MAX_RELATIONSHIP_NAME_LENGTH {
        return Err(EngineError::RelationshipValidation(format!(
            "Relationship {} cannot exceed {} characters",
            what, MAX_RELATIONSHIP_NAME_LENGTH
        )));
    }
    // '.' is reserved for element keys such as `tags.*`
    if value.contains('.') || value.contains('*') {
        return Err(EngineError::RelationshipValidation(format!(
            "Relationship {} '{}' cannot contain '.' or '*'",
            what, value
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
