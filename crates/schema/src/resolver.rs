//! Relationship Resolver
//!
//! Classifies every relationship definition touching an entity by direction
//! and cardinality, as seen from that entity.
//!
//! ## Direction
//!
//! For an entity `E` and an edge `A -> B`:
//!
//! - `E == A`: `E` is the **source**, the field is `name`, the related entity is `B`
//! - `E == B`: `E` is the **target**, the field is `inverse_name`, the related entity is `A`
//!
//! A self-referencing edge (`A -> A`) is seen from the source side only.

use std::collections::{HashMap, HashSet};

use morphic_core::{EntityId, RelationType, RelationshipId};
use serde::{Deserialize, Serialize};

use crate::relationship::EntityRelationship;

// ============================================================================
// ResolvedRelationship
// ============================================================================

/// One relationship definition, oriented relative to a given entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRelationship {
    /// Id of the underlying `EntityRelationship`
    pub relationship_id: RelationshipId,

    /// Cardinality of the underlying edge
    #[serde(rename = "relationship_type")]
    pub relation_type: RelationType,

    /// Whether the entity is the `from` end of the edge
    pub is_source: bool,

    /// Field name exposed on the entity (`name` or `inverse_name`)
    #[serde(rename = "name")]
    pub field_name: String,

    /// Field name exposed on the other end
    #[serde(rename = "opposite_name")]
    pub opposite_field_name: String,

    /// Entity on the other end of the edge
    pub related_entity_id: EntityId,

    /// Whether the field accepts several record ids
    pub multiple: bool,
}

impl ResolvedRelationship {
    /// Orient `relationship` relative to `entity_id`
    ///
    /// Returns `None` when the edge does not touch the entity.
    pub fn orient(entity_id: EntityId, relationship: &EntityRelationship) -> Option<Self> {
        let is_source = relationship.from_entity_id == entity_id;
        if !is_source && relationship.to_entity_id != entity_id {
            return None;
        }

        let (field_name, opposite_field_name, related_entity_id) = if is_source {
            (
                &relationship.name,
                &relationship.inverse_name,
                relationship.to_entity_id,
            )
        } else {
            (
                &relationship.inverse_name,
                &relationship.name,
                relationship.from_entity_id,
            )
        };

        Some(Self {
            relationship_id: relationship.id,
            relation_type: relationship.relation_type,
            is_source,
            field_name: field_name.clone(),
            opposite_field_name: opposite_field_name.clone(),
            related_entity_id,
            multiple: relationship.relation_type.is_multiple(is_source),
        })
    }

    /// Orient `(from, to)` of a new edge between the entity's record and a target record
    pub fn edge_endpoints(&self, own_record: i64, other_record: i64) -> (i64, i64) {
        if self.is_source {
            (own_record, other_record)
        } else {
            (other_record, own_record)
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve every edge touching `entity_id`
///
/// Edges that do not touch the entity are skipped and each edge id is
/// resolved once, keeping input order.
pub fn resolve(
    entity_id: EntityId,
    relationships: &[EntityRelationship],
) -> Vec<ResolvedRelationship> {
    let mut seen = HashSet::new();
    relationships
        .iter()
        .filter(|rel| seen.insert(rel.id))
        .filter_map(|rel| ResolvedRelationship::orient(entity_id, rel))
        .collect()
}

/// Index resolved relationships by their exposed field name
///
/// When two edges expose the same field name the first one wins.
pub fn by_field_name(resolved: &[ResolvedRelationship]) -> HashMap<&str, &ResolvedRelationship> {
    let mut index = HashMap::with_capacity(resolved.len());
    for rel in resolved {
        index.entry(rel.field_name.as_str()).or_insert(rel);
    }
    index
}

// ============================================================================
// Tests
// ============================================================================
