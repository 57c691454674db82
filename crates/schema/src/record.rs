//! Record rows
//!
//! A record has no columns of its own. Its attribute data lives in
//! `EntityValue` rows and its links to other records in `RecordRelationship`
//! rows.

use morphic_core::{AttributeId, EntityId, RecordId, RelationshipId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

// ============================================================================
// Record
// ============================================================================

/// One instance of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub entity_id: EntityId,
    pub created_by: Option<UserId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// EntityValue
// ============================================================================

/// One (record, attribute) value cell, always stored as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityValue {
    pub id: i64,
    pub entity_id: EntityId,
    pub record_id: RecordId,
    pub attribute_id: AttributeId,
    /// Raw stored text; `None` when the submitted value was null
    pub value: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// RecordRelationship
// ============================================================================

/// One concrete edge between two records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRelationship {
    pub id: i64,
    /// The `EntityRelationship` this edge instantiates
    pub relationship_id: RelationshipId,
    pub from_record_id: RecordId,
    pub to_record_id: RecordId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RecordRelationship {
    /// The record on the other end, seen from `record_id`
    pub fn other_end(&self, record_id: RecordId) -> Option<RecordId> {
        if self.from_record_id == record_id {
            Some(self.to_record_id)
        } else if self.to_record_id == record_id {
            Some(self.from_record_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_other_end() {
        let edge = RecordRelationship {
            id: 1,
            relationship_id: 2,
            from_record_id: 10,
            to_record_id: 20,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(edge.other_end(10), Some(20));
        assert_eq!(edge.other_end(20), Some(10));
        assert_eq!(edge.other_end(30), None);
    }
}
