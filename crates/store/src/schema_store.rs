//! # Schema Store
//!
//! Persistence for entities, attributes, the attribute/entity attachment
//! pivot and relationship definitions.
//!
//! Every mutation reports the entities whose cached form artifacts it made
//! stale, as an [`Invalidation`]. Deletions take a callback that receives the
//! invalidation before the row is removed, so the cache never outlives the
//! data it was computed from.

use morphic_core::{
    AttributeId, DataType, EngineError, EngineResult, EntityId, RelationType, RelationshipId,
    Validatable,
};
use morphic_forms::Invalidation;
use morphic_schema::{
    Attribute, AttributeUpdate, Entity, EntityRelationship, EntityUpdate, NewAttribute, NewEntity,
    NewRelationship, SchemaSource,
};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::database::{Database, is_unique_violation, now};

// ============================================================================
// Mutation
// ============================================================================

/// Result of a schema mutation plus the cache entries it made stale
#[must_use = "apply the invalidation to the schema cache"]
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub value: T,
    pub invalidation: Invalidation,
}

impl<T> Mutation<T> {
    pub fn new(value: T, invalidation: Invalidation) -> Self {
        Self {
            value,
            invalidation,
        }
    }
}

// ============================================================================
// Column conversions
// ============================================================================

struct StoredDataType(DataType);

impl FromSql for StoredDataType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<DataType>()
            .map(StoredDataType)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

struct StoredRelationType(RelationType);

impl FromSql for StoredRelationType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse::<RelationType>()
            .map(StoredRelationType)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

const ENTITY_COLUMNS: &str = "id, name, slug, description, created_by, created_at, updated_at";

const ATTRIBUTE_COLUMNS: &str = "a.id, a.name, a.slug, a.data_type, a.is_required, a.is_unique, \
     a.default_value, a.created_by, a.created_at, a.updated_at";

const RELATIONSHIP_COLUMNS: &str = "id, type, name, inverse_name, from_entity_id, to_entity_id";

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn attribute_from_row(row: &Row<'_>) -> rusqlite::Result<Attribute> {
    let StoredDataType(data_type) = row.get(3)?;
    Ok(Attribute {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        data_type,
        is_required: row.get(4)?,
        is_unique: row.get(5)?,
        default_value: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<EntityRelationship> {
    let StoredRelationType(relation_type) = row.get(1)?;
    Ok(EntityRelationship {
        id: row.get(0)?,
        relation_type,
        name: row.get(2)?,
        inverse_name: row.get(3)?,
        from_entity_id: row.get(4)?,
        to_entity_id: row.get(5)?,
    })
}

/// Map a UNIQUE violation on `slug` to `DuplicateSlug`
fn slug_conflict(table: &str, slug: &str) -> impl FnOnce(rusqlite::Error) -> EngineError {
    let table = table.to_string();
    let slug = slug.to_string();
    move |err| {
        if is_unique_violation(&err) {
            EngineError::DuplicateSlug { table, slug }
        } else {
            err.into()
        }
    }
}

// ============================================================================
// SchemaStore
// ============================================================================

/// Entity, attribute and relationship definitions
#[derive(Debug, Clone)]
pub struct SchemaStore {
    db: Database,
}

impl SchemaStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Create an entity, deriving the slug from the name when none is given
    pub fn create_entity(&self, input: NewEntity) -> EngineResult<Mutation<Entity>> {
        input.validate()?;
        let slug = input.resolved_slug();
        let timestamp = now();

        let entity = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO entities (name, slug, description, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![input.name, slug, input.description, input.created_by, timestamp],
            )
            .map_err(slug_conflict("entities", &slug))?;
            Ok(Entity {
                id: conn.last_insert_rowid(),
                name: input.name.clone(),
                slug: slug.clone(),
                description: input.description.clone(),
                created_by: input.created_by,
                created_at: timestamp,
                updated_at: timestamp,
            })
        })?;

        info!(entity_id = entity.id, slug = %entity.slug, "entity created");
        let invalidation = Invalidation::entity(entity.id);
        Ok(Mutation::new(entity, invalidation))
    }

    /// Update an entity
    ///
    /// Relationship partners are invalidated too: their relationship fields
    /// carry this entity's slug.
    pub fn update_entity(
        &self,
        entity_id: EntityId,
        update: EntityUpdate,
    ) -> EngineResult<Mutation<Entity>> {
        let mut entity = self.find_entity(entity_id)?;
        update.apply_to(&mut entity)?;
        entity.updated_at = now();

        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE entities SET name = ?1, slug = ?2, description = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    entity.name,
                    entity.slug,
                    entity.description,
                    entity.updated_at,
                    entity.id
                ],
            )
            .map_err(slug_conflict("entities", &entity.slug))?;
            Ok(())
        })?;

        info!(entity_id, slug = %entity.slug, "entity updated");
        let invalidation = self.entity_invalidation(entity_id)?;
        Ok(Mutation::new(entity, invalidation))
    }

    /// Delete an entity and, through cascades, its relationships,
    /// attachments, records, values and record edges
    ///
    /// `before_delete` receives the invalidation for the entity and all its
    /// relationship partners before the row is removed.
    pub fn delete_entity(
        &self,
        entity_id: EntityId,
        before_delete: impl FnOnce(&Invalidation),
    ) -> EngineResult<Invalidation> {
        let entity = self.find_entity(entity_id)?;
        let invalidation = self.entity_invalidation(entity_id)?;
        before_delete(&invalidation);

        self.db.with_connection(|conn| {
            conn.execute("DELETE FROM entities WHERE id = ?1", [entity_id])?;
            Ok(())
        })?;

        info!(entity_id, slug = %entity.slug, "entity deleted");
        Ok(invalidation)
    }

    pub fn find_entity(&self, entity_id: EntityId) -> EngineResult<Entity> {
        self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM entities WHERE id = ?1", ENTITY_COLUMNS),
                [entity_id],
                entity_from_row,
            )
            .optional()?
            .ok_or(EngineError::EntityNotFound(entity_id))
        })
    }

    pub fn find_entity_by_slug(&self, slug: &str) -> EngineResult<Entity> {
        self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM entities WHERE slug = ?1", ENTITY_COLUMNS),
                [slug],
                entity_from_row,
            )
            .optional()?
            .ok_or_else(|| EngineError::EntitySlugNotFound(slug.to_string()))
        })
    }

    /// All entities, by id
    pub fn list_entities(&self) -> EngineResult<Vec<Entity>> {
        self.db.with_connection(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM entities ORDER BY id", ENTITY_COLUMNS))?;
            let entities = stmt
                .query_map([], entity_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entities)
        })
    }

    /// The entity itself plus every entity it shares a relationship with
    fn entity_invalidation(&self, entity_id: EntityId) -> EngineResult<Invalidation> {
        let mut invalidation = Invalidation::entity(entity_id);
        for relationship in self.relationships_for_entity(entity_id)? {
            for endpoint in relationship.endpoints() {
                invalidation.add(endpoint);
            }
        }
        Ok(invalidation)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Create an unattached attribute
    pub fn create_attribute(&self, input: NewAttribute) -> EngineResult<Mutation<Attribute>> {
        input.validate()?;
        let slug = input.resolved_slug();
        let timestamp = now();

        let attribute = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO attributes
                    (name, slug, data_type, is_required, is_unique, default_value, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    input.name,
                    slug,
                    input.data_type.as_str(),
                    input.is_required,
                    input.is_unique,
                    input.default_value,
                    input.created_by,
                    timestamp
                ],
            )
            .map_err(slug_conflict("attributes", &slug))?;
            Ok(Attribute {
                id: conn.last_insert_rowid(),
                name: input.name.clone(),
                slug: slug.clone(),
                data_type: input.data_type,
                is_required: input.is_required,
                is_unique: input.is_unique,
                default_value: input.default_value.clone(),
                created_by: input.created_by,
                created_at: timestamp,
                updated_at: timestamp,
            })
        })?;

        info!(attribute_id = attribute.id, slug = %attribute.slug, "attribute created");
        Ok(Mutation::new(attribute, Invalidation::none()))
    }

    /// Update an attribute, invalidating every entity it is attached to
    pub fn update_attribute(
        &self,
        attribute_id: AttributeId,
        update: AttributeUpdate,
    ) -> EngineResult<Mutation<Attribute>> {
        let mut attribute = self.find_attribute(attribute_id)?;
        update.apply_to(&mut attribute)?;
        attribute.updated_at = now();

        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE attributes SET name = ?1, slug = ?2, data_type = ?3, is_required = ?4,
                    is_unique = ?5, default_value = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    attribute.name,
                    attribute.slug,
                    attribute.data_type.as_str(),
                    attribute.is_required,
                    attribute.is_unique,
                    attribute.default_value,
                    attribute.updated_at,
                    attribute.id
                ],
            )
            .map_err(slug_conflict("attributes", &attribute.slug))?;
            Ok(())
        })?;

        info!(attribute_id, slug = %attribute.slug, "attribute updated");
        let invalidation = Invalidation::entities(self.entities_for_attribute(attribute_id)?);
        Ok(Mutation::new(attribute, invalidation))
    }

    /// Delete an attribute together with its attachments and stored values
    pub fn delete_attribute(
        &self,
        attribute_id: AttributeId,
        before_delete: impl FnOnce(&Invalidation),
    ) -> EngineResult<Invalidation> {
        let attribute = self.find_attribute(attribute_id)?;
        let invalidation = Invalidation::entities(self.entities_for_attribute(attribute_id)?);
        before_delete(&invalidation);

        self.db.with_connection(|conn| {
            conn.execute("DELETE FROM attributes WHERE id = ?1", [attribute_id])?;
            Ok(())
        })?;

        info!(attribute_id, slug = %attribute.slug, "attribute deleted");
        Ok(invalidation)
    }

    pub fn find_attribute(&self, attribute_id: AttributeId) -> EngineResult<Attribute> {
        self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM attributes a WHERE a.id = ?1", ATTRIBUTE_COLUMNS),
                [attribute_id],
                attribute_from_row,
            )
            .optional()?
            .ok_or(EngineError::AttributeNotFound(attribute_id))
        })
    }

    pub fn find_attribute_by_slug(&self, slug: &str) -> EngineResult<Attribute> {
        self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM attributes a WHERE a.slug = ?1", ATTRIBUTE_COLUMNS),
                [slug],
                attribute_from_row,
            )
            .optional()?
            .ok_or_else(|| EngineError::AttributeSlugNotFound(slug.to_string()))
        })
    }

    /// All attributes, by id
    pub fn list_attributes(&self) -> EngineResult<Vec<Attribute>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM attributes a ORDER BY a.id",
                ATTRIBUTE_COLUMNS
            ))?;
            let attributes = stmt
                .query_map([], attribute_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(attributes)
        })
    }

    /// Attributes attached to an entity, in attachment order
    pub fn attributes_for_entity(&self, entity_id: EntityId) -> EngineResult<Vec<Attribute>> {
        self.db
            .with_connection(|conn| query_attributes_for_entity(conn, entity_id))
    }

    /// Ids of the entities an attribute is attached to
    pub fn entities_for_attribute(&self, attribute_id: AttributeId) -> EngineResult<Vec<EntityId>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT entity_id FROM attribute_entity WHERE attribute_id = ?1 ORDER BY entity_id",
            )?;
            let ids = stmt
                .query_map([attribute_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<EntityId>>>()?;
            Ok(ids)
        })
    }

    /// Attach an attribute to an entity
    ///
    /// Returns `false` when the pair is already attached.
    pub fn attach_attribute(
        &self,
        attribute_id: AttributeId,
        entity_id: EntityId,
    ) -> EngineResult<Mutation<bool>> {
        self.find_attribute(attribute_id)?;
        self.find_entity(entity_id)?;

        let inserted = self.db.with_connection(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO attribute_entity (attribute_id, entity_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![attribute_id, entity_id, now()],
            )?;
            Ok(changed == 1)
        })?;

        if inserted {
            info!(attribute_id, entity_id, "attribute attached");
            Ok(Mutation::new(true, Invalidation::entity(entity_id)))
        } else {
            Ok(Mutation::new(false, Invalidation::none()))
        }
    }

    /// Detach an attribute from an entity
    ///
    /// Values already stored for the pair are kept; reads only look at
    /// attached attributes, so they stay hidden until re-attached. Returns
    /// `false` when the pair was not attached.
    pub fn detach_attribute(
        &self,
        attribute_id: AttributeId,
        entity_id: EntityId,
    ) -> EngineResult<Mutation<bool>> {
        self.find_attribute(attribute_id)?;
        self.find_entity(entity_id)?;

        let removed = self.db.with_connection(|conn| {
            let changed = conn.execute(
                "DELETE FROM attribute_entity WHERE attribute_id = ?1 AND entity_id = ?2",
                params![attribute_id, entity_id],
            )?;
            Ok(changed == 1)
        })?;

        if removed {
            info!(attribute_id, entity_id, "attribute detached");
            Ok(Mutation::new(true, Invalidation::entity(entity_id)))
        } else {
            Ok(Mutation::new(false, Invalidation::none()))
        }
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a relationship, deriving omitted field names from the entity slugs
    pub fn create_relationship(
        &self,
        input: NewRelationship,
    ) -> EngineResult<Mutation<EntityRelationship>> {
        let from = self.find_entity(input.from_entity_id)?;
        let to = self.find_entity(input.to_entity_id)?;
        let input = input.resolve_names(&from.slug, &to.slug);
        input.validate()?;

        let id = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO entity_relationships (type, name, inverse_name, from_entity_id, to_entity_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    input.relation_type.as_str(),
                    input.name,
                    input.inverse_name,
                    input.from_entity_id,
                    input.to_entity_id
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        let relationship = input.into_relationship(id)?;
        info!(
            relationship_id = relationship.id,
            relation_type = %relationship.relation_type,
            name = %relationship.name,
            inverse_name = %relationship.inverse_name,
            "relationship created"
        );
        let invalidation = Invalidation::entities(relationship.endpoints());
        Ok(Mutation::new(relationship, invalidation))
    }

    /// Delete a relationship definition and all record edges that use it
    pub fn delete_relationship(
        &self,
        relationship_id: RelationshipId,
        before_delete: impl FnOnce(&Invalidation),
    ) -> EngineResult<Invalidation> {
        let relationship = self.find_relationship(relationship_id)?;
        let invalidation = Invalidation::entities(relationship.endpoints());
        before_delete(&invalidation);

        self.db.with_connection(|conn| {
            conn.execute(
                "DELETE FROM entity_relationships WHERE id = ?1",
                [relationship_id],
            )?;
            Ok(())
        })?;

        info!(relationship_id, "relationship deleted");
        Ok(invalidation)
    }

    pub fn find_relationship(
        &self,
        relationship_id: RelationshipId,
    ) -> EngineResult<EntityRelationship> {
        self.db.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM entity_relationships WHERE id = ?1",
                    RELATIONSHIP_COLUMNS
                ),
                [relationship_id],
                relationship_from_row,
            )
            .optional()?
            .ok_or(EngineError::RelationshipNotFound(relationship_id))
        })
    }

    /// All relationship definitions, by id
    pub fn list_relationships(&self) -> EngineResult<Vec<EntityRelationship>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM entity_relationships ORDER BY id",
                RELATIONSHIP_COLUMNS
            ))?;
            let relationships = stmt
                .query_map([], relationship_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(relationships)
        })
    }

    /// Outgoing edges then incoming edges, each by id
    ///
    /// A self-referencing edge is listed once, with the outgoing ones.
    pub fn relationships_for_entity(
        &self,
        entity_id: EntityId,
    ) -> EngineResult<Vec<EntityRelationship>> {
        self.db.with_connection(|conn| {
            let mut outgoing = conn.prepare(&format!(
                "SELECT {} FROM entity_relationships WHERE from_entity_id = ?1 ORDER BY id",
                RELATIONSHIP_COLUMNS
            ))?;
            let mut relationships = outgoing
                .query_map([entity_id], relationship_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut incoming = conn.prepare(&format!(
                "SELECT {} FROM entity_relationships
                 WHERE to_entity_id = ?1 AND from_entity_id != ?1 ORDER BY id",
                RELATIONSHIP_COLUMNS
            ))?;
            for relationship in incoming.query_map([entity_id], relationship_from_row)? {
                relationships.push(relationship?);
            }
            Ok(relationships)
        })
    }
}

pub(crate) fn query_attributes_for_entity(
    conn: &Connection,
    entity_id: EntityId,
) -> EngineResult<Vec<Attribute>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM attributes a
         JOIN attribute_entity ae ON ae.attribute_id = a.id
         WHERE ae.entity_id = ?1
         ORDER BY ae.id",
        ATTRIBUTE_COLUMNS
    ))?;
    let attributes = stmt
        .query_map([entity_id], attribute_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(attributes)
}

impl SchemaSource for SchemaStore {
    fn entity(&self, entity_id: EntityId) -> EngineResult<Entity> {
        self.find_entity(entity_id)
    }

    fn attributes_for_entity(&self, entity_id: EntityId) -> EngineResult<Vec<Attribute>> {
        SchemaStore::attributes_for_entity(self, entity_id)
    }

    fn relationships_for_entity(
        &self,
        entity_id: EntityId,
    ) -> EngineResult<Vec<EntityRelationship>> {
        SchemaStore::relationships_for_entity(self, entity_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn store() -> SchemaStore {
        SchemaStore::new(Database::open_in_memory().unwrap())
    }

    fn entity(store: &SchemaStore, name: &str) -> Entity {
        store.create_entity(NewEntity::new(name)).unwrap().value
    }

    #[test]
    fn test_create_entity_derives_slug() {
        let store = store();
        let created = store.create_entity(NewEntity::new("My Product")).unwrap();
        assert_eq!(created.value.slug, "my-product");
        assert!(created.invalidation.contains(created.value.id));

        let found = store.find_entity_by_slug("my-product").unwrap();
        assert_eq!(found, created.value);
    }

    #[test]
    fn test_create_entity_keeps_explicit_slug() {
        let store = store();
        let created = store
            .create_entity(NewEntity::new("My Product").with_slug("custom-slug"))
            .unwrap();
        assert_eq!(created.value.slug, "custom-slug");
    }

    #[test]
    fn test_duplicate_entity_slug() {
        let store = store();
        entity(&store, "Article");
        let err = store.create_entity(NewEntity::new("article")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSlug { .. }));
    }

    #[test]
    fn test_entity_not_found() {
        let store = store();
        assert!(matches!(
            store.find_entity(42).unwrap_err(),
            EngineError::EntityNotFound(42)
        ));
        assert!(store.find_entity_by_slug("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_entity() {
        let store = store();
        let article = entity(&store, "Article");
        let tag = entity(&store, "Tag");
        store
            .create_relationship(NewRelationship::one_to_many(article.id, tag.id))
            .unwrap();

        let updated = store
            .update_entity(article.id, EntityUpdate::default().with_slug("post"))
            .unwrap();
        assert_eq!(updated.value.slug, "post");
        assert!(updated.invalidation.contains(article.id));
        assert!(updated.invalidation.contains(tag.id));
        assert_eq!(store.find_entity(article.id).unwrap().slug, "post");
    }

    #[test]
    fn test_attach_is_idempotent() {
        let store = store();
        let article = entity(&store, "Article");
        let title = store
            .create_attribute(NewAttribute::string("Title"))
            .unwrap()
            .value;

        let first = store.attach_attribute(title.id, article.id).unwrap();
        assert!(first.value);
        assert!(first.invalidation.contains(article.id));

        assert_eq!(store.find_attribute_by_slug("title").unwrap(), title);
        assert!(store.find_attribute_by_slug("body").unwrap_err().is_not_found());

        let second = store.attach_attribute(title.id, article.id).unwrap();
        assert!(!second.value);
        assert!(second.invalidation.is_empty());

        assert_eq!(store.attributes_for_entity(article.id).unwrap(), vec![title.clone()]);
        assert_eq!(store.entities_for_attribute(title.id).unwrap(), vec![article.id]);

        assert!(store.detach_attribute(title.id, article.id).unwrap().value);
        assert!(!store.detach_attribute(title.id, article.id).unwrap().value);
        assert!(store.attributes_for_entity(article.id).unwrap().is_empty());
    }

    #[test]
    fn test_attach_unknown_ids() {
        let store = store();
        let article = entity(&store, "Article");
        assert!(matches!(
            store.attach_attribute(9, article.id).unwrap_err(),
            EngineError::AttributeNotFound(9)
        ));
    }

    #[test]
    fn test_attribute_order_follows_attachment() {
        let store = store();
        let article = entity(&store, "Article");
        let body = store.create_attribute(NewAttribute::string("Body")).unwrap().value;
        let title = store.create_attribute(NewAttribute::string("Title")).unwrap().value;

        let _ = store.attach_attribute(title.id, article.id).unwrap();
        let _ = store.attach_attribute(body.id, article.id).unwrap();

        let slugs: Vec<String> = store
            .attributes_for_entity(article.id)
            .unwrap()
            .into_iter()
            .map(|a| a.slug)
            .collect();
        assert_eq!(slugs, vec!["title", "body"]);
    }

    #[test]
    fn test_update_attribute_invalidates_attached_entities() {
        let store = store();
        let article = entity(&store, "Article");
        let page = entity(&store, "Page");
        let title = store.create_attribute(NewAttribute::string("Title")).unwrap().value;
        let _ = store.attach_attribute(title.id, article.id).unwrap();
        let _ = store.attach_attribute(title.id, page.id).unwrap();

        let updated = store
            .update_attribute(title.id, AttributeUpdate::default().with_required(true))
            .unwrap();
        assert!(updated.value.is_required);
        assert_eq!(
            updated.invalidation,
            Invalidation::entities([article.id, page.id])
        );
        assert!(store.find_attribute(title.id).unwrap().is_required);
    }

    #[test]
    fn test_relationship_names_derived() {
        let store = store();
        let article = entity(&store, "Article");
        let tag = entity(&store, "Tag");

        let cases = [
            (RelationType::OneToOne, "article_tag", "tag_article"),
            (RelationType::OneToMany, "article_tags", "tag_article"),
            (RelationType::ManyToMany, "article_tags", "tag_articles"),
        ];
        for (relation_type, name, inverse_name) in cases {
            let created = store
                .create_relationship(NewRelationship::new(relation_type, article.id, tag.id))
                .unwrap();
            assert_eq!(created.value.name, name);
            assert_eq!(created.value.inverse_name, inverse_name);
            assert_eq!(
                created.invalidation,
                Invalidation::entities([article.id, tag.id])
            );
            assert_eq!(store.find_relationship(created.value.id).unwrap(), created.value);
        }
    }

    #[test]
    fn test_relationship_to_missing_entity() {
        let store = store();
        let article = entity(&store, "Article");
        let err = store
            .create_relationship(NewRelationship::one_to_many(article.id, 77))
            .unwrap_err();
        assert!(matches!(err, EngineError::EntityNotFound(77)));
    }

    #[test]
    fn test_relationships_for_entity_union() {
        let store = store();
        let article = entity(&store, "Article");
        let tag = entity(&store, "Tag");
        let person = entity(&store, "Person");

        let incoming = store
            .create_relationship(NewRelationship::one_to_many(person.id, article.id))
            .unwrap()
            .value;
        let outgoing = store
            .create_relationship(NewRelationship::many_to_many(article.id, tag.id))
            .unwrap()
            .value;
        let self_edge = store
            .create_relationship(
                NewRelationship::one_to_many(article.id, article.id)
                    .with_name("children")
                    .with_inverse_name("parent"),
            )
            .unwrap()
            .value;
        store
            .create_relationship(NewRelationship::one_to_one(tag.id, person.id))
            .unwrap();

        let ids: Vec<RelationshipId> = store
            .relationships_for_entity(article.id)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![outgoing.id, self_edge.id, incoming.id]);
    }

    #[test]
    fn test_delete_entity_invalidates_before_delete() {
        let store = store();
        let article = entity(&store, "Article");
        let tag = entity(&store, "Tag");
        let relationship = store
            .create_relationship(NewRelationship::one_to_many(article.id, tag.id))
            .unwrap()
            .value;

        let seen = RefCell::new(None);
        let invalidation = store
            .delete_entity(article.id, |inv| {
                // the entity still exists while the callback runs
                assert!(store.find_entity(article.id).is_ok());
                *seen.borrow_mut() = Some(inv.clone());
            })
            .unwrap();

        assert_eq!(invalidation, Invalidation::entities([article.id, tag.id]));
        assert_eq!(seen.into_inner(), Some(invalidation));
        assert!(store.find_entity(article.id).unwrap_err().is_not_found());
        assert!(store.find_relationship(relationship.id).unwrap_err().is_not_found());
        assert!(store.relationships_for_entity(tag.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_relationship() {
        let store = store();
        let article = entity(&store, "Article");
        let tag = entity(&store, "Tag");
        let relationship = store
            .create_relationship(NewRelationship::one_to_many(article.id, tag.id))
            .unwrap()
            .value;

        let invalidation = store.delete_relationship(relationship.id, |_| {}).unwrap();
        assert_eq!(invalidation, Invalidation::entities([article.id, tag.id]));
        assert!(store.list_relationships().unwrap().is_empty());
        assert!(store.delete_relationship(relationship.id, |_| {}).is_err());
    }

    #[test]
    fn test_delete_attribute_cascades_attachment() {
        let store = store();
        let article = entity(&store, "Article");
        let title = store.create_attribute(NewAttribute::string("Title")).unwrap().value;
        let _ = store.attach_attribute(title.id, article.id).unwrap();

        let invalidation = store.delete_attribute(title.id, |_| {}).unwrap();
        assert!(invalidation.contains(article.id));
        assert!(store.attributes_for_entity(article.id).unwrap().is_empty());
        assert!(store.list_attributes().unwrap().is_empty());
    }

    #[test]
    fn test_list_entities() {
        let store = store();
        entity(&store, "Article");
        entity(&store, "Tag");
        let slugs: Vec<String> = store
            .list_entities()
            .unwrap()
            .into_iter()
            .map(|e| e.slug)
            .collect();
        assert_eq!(slugs, vec!["article", "tag"]);
    }
}
