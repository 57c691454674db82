//! # Morphic Schema
//!
//! This crate provides the schema model for Morphic. It contains the data
//! structures administrators define at runtime and the rows records are
//! stored as.
//!
//! ## Core Concepts
//!
//! - **Entity**: an admin-defined content type (e.g., Article, Tag)
//! - **Attribute**: a typed field, defined once and attachable to many entities
//! - **EntityRelationship**: a named, directed edge definition between two entities
//! - **Record**: one instance of an entity, whose values live in `EntityValue` rows
//! - **RecordRelationship**: one concrete edge between two records
//!

// Module declarations
pub mod attribute;
pub mod entity;
pub mod naming;
pub mod record;
pub mod relationship;
pub mod resolver;
pub mod source;

// Re-export commonly used types at crate root
pub use attribute::{Attribute, AttributeUpdate, NewAttribute};
pub use entity::{Entity, EntityUpdate, NewEntity};
pub use naming::{humanize, pluralize, relationship_names, singularize, slugify};
pub use record::{EntityValue, Record, RecordRelationship};
pub use relationship::{EntityRelationship, NewRelationship};
pub use resolver::{ResolvedRelationship, by_field_name, resolve};
pub use source::SchemaSource;

// Re-export core types that are commonly used with the schema
pub use morphic_core::{
    AttributeId, DataType, EngineError, EngineResult, EntityId, RecordId, RelationType,
    RelationshipId, Timestamp, UserId, Validatable,
};

/// Maximum length of entity and attribute names and slugs
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length of relationship field names
pub const MAX_RELATIONSHIP_NAME_LENGTH: usize = 100;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient re-exports for common usage
pub mod prelude {
    pub use crate::{
        // Schema types
        Attribute,
        // Re-exported from core
        DataType,
        EngineError,
        EngineResult,
        Entity,
        EntityRelationship,
        EntityValue,
        NewAttribute,
        NewEntity,
        NewRelationship,
        Record,
        RecordRelationship,
        RelationType,
        ResolvedRelationship,
        SchemaSource,
        // Helpers
        resolve,
        slugify,
    };
}
