//! Entity definitions
//!
//! An entity is an admin-defined content type. It owns no columns of its own;
//! its shape is the set of attributes attached to it plus the relationships
//! that touch it.

use morphic_core::{EngineError, EngineResult, EntityId, Timestamp, UserId, Validatable};
use serde::{Deserialize, Serialize};

use crate::MAX_NAME_LENGTH;
use crate::naming::{is_valid_slug, slugify};

// ============================================================================
// Entity
// ============================================================================

/// A persisted content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Row identifier
    pub id: EntityId,

    /// Display name (e.g., "Blog Post")
    pub name: String,

    /// Unique URL-safe identifier (e.g., "blog-post")
    pub slug: String,

    /// Human-readable description
    pub description: Option<String>,

    /// User that created the entity, if known
    pub created_by: Option<UserId>,

    /// Creation timestamp
    pub created_at: Timestamp,

    /// Last modification timestamp
    pub updated_at: Timestamp,
}

// ============================================================================
// NewEntity
// ============================================================================

/// Input for creating an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,

    /// Explicit slug; derived from `name` when absent
    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub created_by: Option<UserId>,
}

impl NewEntity {
    /// Create input with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Set an explicit slug, kept verbatim
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the creating user
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

impl Validatable for NewEntity {
    fn validate(&self) -> EngineResult<()> {
        validate_name_and_slug(&self.name, &self.resolved_slug())
    }
}

// ============================================================================
// EntityUpdate
// ============================================================================

/// Partial update of an entity; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub slug: Option<String>,

    /// `Some(None)` clears the description
    #[serde(default)]
    pub description: Option<Option<String>>,
}

impl EntityUpdate {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    /// Apply the update to an entity in place and validate the result
    pub fn apply_to(&self, entity: &mut Entity) -> EngineResult<()> {
        if let Some(name) = &self.name {
            entity.name = name.clone();
        }
        if let Some(slug) = &self.slug {
            entity.slug = slug.clone();
        }
        if let Some(description) = &self.description {
            entity.description = description.clone();
        }
        validate_name_and_slug(&entity.name, &entity.slug)
    }
}

fn validate_name_and_slug(name: &str, slug: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::entity_validation(
            name,
            "Entity name cannot be empty",
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(EngineError::entity_validation(
            name,
            format!("Entity name cannot exceed {} characters", MAX_NAME_LENGTH),
        ));
    }
    if slug.is_empty() {
        return Err(EngineError::entity_validation(
            name,
            "Entity slug cannot be empty",
        ));
    }
    if slug.chars().count() > MAX_NAME_LENGTH {
        return Err(EngineError::entity_validation(
            name,
            format!("Entity slug cannot exceed {} characters", MAX_NAME_LENGTH),
        ));
    }
    if !is_valid_slug(slug) {
        return Err(EngineError::entity_validation(
            name,
            format!("'{}' is not a valid slug", slug),
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
