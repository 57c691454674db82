//! Read access to persisted schema definitions
//!
//! Generators and caches depend on this trait rather than on a concrete
//! store, so they can be driven from memory in tests.

use morphic_core::{EngineResult, EntityId};

use crate::attribute::Attribute;
use crate::entity::Entity;
use crate::relationship::EntityRelationship;

/// Source of current schema state
pub trait SchemaSource {
    /// Look up an entity by id, failing with `EntityNotFound`
    fn entity(&self, entity_id: EntityId) -> EngineResult<Entity>;

    /// Attributes attached to an entity, in attachment order
    fn attributes_for_entity(&self, entity_id: EntityId) -> EngineResult<Vec<Attribute>>;

    /// Every relationship definition touching an entity, each edge once
    fn relationships_for_entity(&self, entity_id: EntityId)
    -> EngineResult<Vec<EntityRelationship>>;
}
