//! # Record Store
//!
//! Entity-attribute-value persistence for records.
//!
//! A record is a bare row in `records`; its attribute values live in
//! `entity_values` as text and its links to other records in
//! `record_relationships`. Reads re-type the stored text with the
//! attribute's [`DataType`](morphic_core::DataType).
//!
//! ## Read shape
//!
//! [`RecordStore::find_by_id`] returns a JSON object with `id` first, one
//! key per attached attribute, then the records linking *to* this record
//! nested under the edge's `inverse_name`, then the timestamps. Only edges
//! whose `to_record_id` is the record are followed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::SecondsFormat;
use morphic_core::{
    AttributeId, EngineError, EngineResult, EntityId, RecordId, RelationType, Timestamp, UserId,
    to_stored_text,
};
use morphic_forms::RuleContext;
use morphic_forms::validator::as_integer;
use morphic_schema::{
    Attribute, Entity, EntityValue, Record, RecordRelationship, ResolvedRelationship,
    by_field_name,
};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::database::{Database, now};

const RECORD_COLUMNS: &str = "id, entity_id, created_by, created_at, updated_at";

const VALUE_COLUMNS: &str =
    "id, entity_id, record_id, attribute_id, value, created_at, updated_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        created_by: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn value_from_row(row: &Row<'_>) -> rusqlite::Result<EntityValue> {
    Ok(EntityValue {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        record_id: row.get(2)?,
        attribute_id: row.get(3)?,
        value: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Timestamps as they appear in record views
pub fn format_timestamp(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// Page
// ============================================================================

/// One page of rows plus the total row count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    /// Number of the last page, at least 1
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(self.per_page.max(1)).max(1)
    }

    /// 1-based position of the first item, `None` for an empty page
    pub fn from(&self) -> Option<u64> {
        if self.items.is_empty() {
            None
        } else {
            Some((self.page - 1) * self.per_page + 1)
        }
    }

    /// 1-based position of the last item, `None` for an empty page
    pub fn to(&self) -> Option<u64> {
        self.from().map(|from| from + self.items.len() as u64 - 1)
    }
}

// ============================================================================
// Incoming edges
// ============================================================================

/// An edge pointing at the record being read, with what is needed to nest it
struct IncomingEdge {
    edge: RecordRelationship,
    definition: Option<(RelationType, String)>,
    related: Option<(Record, Vec<EntityValue>)>,
}

// ============================================================================
// RecordStore
// ============================================================================

/// Records, their values and their edges
#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a record with its values and edges in one transaction
    ///
    /// `attributes` and `relationships` are the entity's attached attributes
    /// and resolved relationships. A key naming both a relationship field
    /// and an attribute is treated as the relationship. Keys matching
    /// neither are ignored.
    pub fn create(
        &self,
        entity: &Entity,
        attributes: &[Attribute],
        relationships: &[ResolvedRelationship],
        data: &Map<String, Value>,
        created_by: Option<UserId>,
    ) -> EngineResult<Record> {
        let relationship_fields = by_field_name(relationships);
        let timestamp = now();

        let (record, value_count, edge_count) = self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO records (entity_id, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![entity.id, created_by, timestamp],
            )?;
            let record = Record {
                id: tx.last_insert_rowid(),
                entity_id: entity.id,
                created_by,
                created_at: timestamp,
                updated_at: timestamp,
            };

            let mut value_count = 0;
            for attribute in attributes {
                if relationship_fields.contains_key(attribute.slug.as_str()) {
                    continue;
                }
                let Some(value) = data.get(&attribute.slug) else {
                    continue;
                };
                tx.execute(
                    "INSERT INTO entity_values
                        (entity_id, record_id, attribute_id, value, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![entity.id, record.id, attribute.id, to_stored_text(value), timestamp],
                )?;
                value_count += 1;
            }

            let mut edge_count = 0;
            for relationship in relationships {
                for target in relationship_targets(relationship, data)? {
                    let (from, to) = relationship.edge_endpoints(record.id, target);
                    tx.execute(
                        "INSERT INTO record_relationships
                            (relationship_id, from_record_id, to_record_id, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![relationship.relationship_id, from, to, timestamp],
                    )?;
                    edge_count += 1;
                }
            }

            Ok((record, value_count, edge_count))
        })?;

        info!(
            entity = %entity.slug,
            record_id = record.id,
            values = value_count,
            edges = edge_count,
            "record created"
        );
        Ok(record)
    }

    /// Read a record of `entity` as a JSON object
    ///
    /// `attributes_of` supplies the attached attributes of any entity, for
    /// the record itself and for nested related records.
    pub fn find_by_id(
        &self,
        entity: &Entity,
        record_id: RecordId,
        attributes_of: impl Fn(EntityId) -> EngineResult<Arc<Vec<Attribute>>>,
    ) -> EngineResult<Map<String, Value>> {
        let (record, values, incoming) = self.db.with_connection(|conn| {
            let record = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM records WHERE id = ?1 AND entity_id = ?2",
                        RECORD_COLUMNS
                    ),
                    params![record_id, entity.id],
                    record_from_row,
                )
                .optional()?
                .ok_or_else(|| EngineError::record_not_found(&entity.slug, record_id))?;
            let values = query_values(conn, record.id)?;
            let incoming = query_incoming(conn, record.id)?;
            Ok((record, values, incoming))
        })?;

        let attributes = attributes_of(entity.id)?;
        let mut view = Map::new();
        view.insert("id".to_string(), Value::from(record.id));
        insert_attribute_values(&mut view, &attributes, &values);

        for incoming in incoming {
            let Some((relation_type, inverse_name)) = incoming.definition else {
                warn!(
                    edge_id = incoming.edge.id,
                    relationship_id = incoming.edge.relationship_id,
                    "skipping record edge without a relationship definition"
                );
                continue;
            };
            let Some((related, related_values)) = incoming.related else {
                warn!(
                    edge_id = incoming.edge.id,
                    from_record_id = incoming.edge.from_record_id,
                    "skipping record edge to a missing record"
                );
                continue;
            };
            let related_attributes = match attributes_of(related.entity_id) {
                Ok(attributes) => attributes,
                Err(err) if err.is_not_found() => {
                    warn!(
                        edge_id = incoming.edge.id,
                        entity_id = related.entity_id,
                        "skipping record edge to a missing entity"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let nested = Value::Object(project(&related, &related_attributes, &related_values));
            match relation_type {
                RelationType::ManyToMany => match view.get_mut(&inverse_name) {
                    Some(Value::Array(items)) => items.push(nested),
                    Some(_) | None => {
                        view.insert(inverse_name, Value::Array(vec![nested]));
                    }
                },
                RelationType::OneToOne | RelationType::OneToMany => {
                    view.insert(inverse_name, nested);
                }
            }
        }

        insert_timestamps(&mut view, &record);
        Ok(view)
    }

    /// Records of `entity`, newest first
    pub fn index(&self, entity: &Entity, per_page: u64, page: u64) -> EngineResult<Page<Record>> {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        self.db.with_connection(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE entity_id = ?1",
                [entity.id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM records WHERE entity_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
                RECORD_COLUMNS
            ))?;
            let items = stmt
                .query_map(
                    params![entity.id, to_sql_int(per_page), to_sql_int(offset)],
                    record_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Page {
                items,
                total: total.max(0) as u64,
                page,
                per_page,
            })
        })
    }

    /// Values of `records`, grouped by record id, in one query
    pub fn records_values(
        &self,
        entity: &Entity,
        records: &[Record],
    ) -> EngineResult<HashMap<RecordId, Vec<EntityValue>>> {
        let mut grouped: HashMap<RecordId, Vec<EntityValue>> = HashMap::new();
        if records.is_empty() {
            return Ok(grouped);
        }

        let placeholders = vec!["?"; records.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM entity_values WHERE entity_id = ? AND record_id IN ({}) ORDER BY id",
            VALUE_COLUMNS, placeholders
        );
        let ids = std::iter::once(entity.id).chain(records.iter().map(|r| r.id));

        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            for value in stmt.query_map(params_from_iter(ids), value_from_row)? {
                let value = value?;
                grouped.entry(value.record_id).or_default().push(value);
            }
            Ok(())
        })?;
        Ok(grouped)
    }

    /// Edges stored for a record, either direction
    pub fn edges_for_record(&self, record_id: RecordId) -> EngineResult<Vec<RecordRelationship>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, relationship_id, from_record_id, to_record_id, created_at, updated_at
                 FROM record_relationships
                 WHERE from_record_id = ?1 OR to_record_id = ?1
                 ORDER BY id",
            )?;
            let edges = stmt
                .query_map([record_id], edge_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(edges)
        })
    }
}

/// Project a record with its values into `{id, attrs.., created_at, updated_at}`
pub fn project(record: &Record, attributes: &[Attribute], values: &[EntityValue]) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("id".to_string(), Value::from(record.id));
    insert_attribute_values(&mut map, attributes, values);
    insert_timestamps(&mut map, record);
    map
}

fn insert_attribute_values(map: &mut Map<String, Value>, attributes: &[Attribute], values: &[EntityValue]) {
    let stored: HashMap<AttributeId, Option<&str>> = values
        .iter()
        .map(|v| (v.attribute_id, v.value.as_deref()))
        .collect();

    for attribute in attributes {
        let value = match stored.get(&attribute.id).copied().flatten() {
            Some(text) => attribute.data_type.decode(text).unwrap_or_else(|| {
                warn!(
                    attribute = %attribute.slug,
                    data_type = %attribute.data_type,
                    value = text,
                    "stored value does not decode as its data type"
                );
                Value::String(text.to_string())
            }),
            None => Value::Null,
        };
        map.insert(attribute.slug.clone(), value);
    }
}

fn insert_timestamps(map: &mut Map<String, Value>, record: &Record) {
    map.insert(
        "created_at".to_string(),
        Value::String(format_timestamp(&record.created_at)),
    );
    map.insert(
        "updated_at".to_string(),
        Value::String(format_timestamp(&record.updated_at)),
    );
}

/// Record ids submitted for a relationship field
///
/// Absent and null values submit nothing; a scalar is a single id.
fn relationship_targets(
    relationship: &ResolvedRelationship,
    data: &Map<String, Value>,
) -> EngineResult<Vec<RecordId>> {
    let items = match data.get(&relationship.field_name) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
        Some(value) => vec![value],
    };

    items
        .into_iter()
        .map(|item| {
            as_integer(item).ok_or_else(|| {
                EngineError::validation(format!(
                    "Relationship field '{}' expects record ids, got {}",
                    relationship.field_name, item
                ))
            })
        })
        .collect()
}

fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<RecordRelationship> {
    Ok(RecordRelationship {
        id: row.get(0)?,
        relationship_id: row.get(1)?,
        from_record_id: row.get(2)?,
        to_record_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn query_values(conn: &Connection, record_id: RecordId) -> EngineResult<Vec<EntityValue>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM entity_values WHERE record_id = ?1 ORDER BY id",
        VALUE_COLUMNS
    ))?;
    let values = stmt
        .query_map([record_id], value_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(values)
}

fn query_incoming(conn: &Connection, record_id: RecordId) -> EngineResult<Vec<IncomingEdge>> {
    let mut stmt = conn.prepare(
        "SELECT rr.id, rr.relationship_id, rr.from_record_id, rr.to_record_id,
                rr.created_at, rr.updated_at, er.type, er.inverse_name
         FROM record_relationships rr
         LEFT JOIN entity_relationships er ON er.id = rr.relationship_id
         WHERE rr.to_record_id = ?1
         ORDER BY rr.id",
    )?;
    let rows = stmt
        .query_map([record_id], |row| {
            let edge = edge_from_row(row)?;
            let relation_type: Option<String> = row.get(6)?;
            let inverse_name: Option<String> = row.get(7)?;
            Ok((edge, relation_type, inverse_name))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut incoming = Vec::with_capacity(rows.len());
    for (edge, relation_type, inverse_name) in rows {
        let definition = match (relation_type, inverse_name) {
            (Some(relation_type), Some(inverse_name)) => {
                Some((relation_type.parse::<RelationType>()?, inverse_name))
            }
            (None, _) | (_, None) => None,
        };

        let related = conn
            .query_row(
                &format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS),
                [edge.from_record_id],
                record_from_row,
            )
            .optional()?;
        let related = match related {
            Some(record) => {
                let values = query_values(conn, record.id)?;
                Some((record, values))
            }
            None => None,
        };

        incoming.push(IncomingEdge {
            edge,
            definition,
            related,
        });
    }
    Ok(incoming)
}

// ============================================================================
// Rule lookups
// ============================================================================

impl RuleContext for RecordStore {
    fn record_exists(&self, entity_id: EntityId, record_id: RecordId) -> EngineResult<bool> {
        self.db.with_connection(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM records WHERE id = ?1 AND entity_id = ?2",
                    params![record_id, entity_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn value_taken(
        &self,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: &str,
        ignore_record: Option<RecordId>,
    ) -> EngineResult<bool> {
        self.db.with_connection(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM entity_values
                     WHERE entity_id = ?1 AND attribute_id = ?2 AND value = ?3
                       AND (?4 IS NULL OR record_id != ?4)
                     LIMIT 1",
                    params![entity_id, attribute_id, value, ignore_record],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
