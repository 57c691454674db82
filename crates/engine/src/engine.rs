//! # Engine
//!
//! The operation facade. [`Engine`] owns the database handle, both stores,
//! the form cache and the configuration, and keeps the cache consistent:
//! every schema mutation applies the invalidation it returns, and deletions
//! apply it before the row goes away.

use std::path::Path;

use morphic_core::{AttributeId, EngineResult, EntityId, RecordId, RelationshipId, UserId};
use morphic_forms::{
    CacheStats, FormGenerator, FormRequest, FormSchema, Invalidation, SchemaCache, validate,
};
use morphic_schema::{
    Attribute, AttributeUpdate, Entity, EntityRelationship, EntityUpdate, NewAttribute, NewEntity,
    NewRelationship,
};
use morphic_store::{Database, RecordStore, SchemaStore, project};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::view::{PageMeta, RecordPage, RecordView};

pub struct Engine {
    db: Database,
    schema: SchemaStore,
    records: RecordStore,
    cache: SchemaCache,
    config: EngineConfig,
}

impl Engine {
    /// Open the database named by `config`, creating tables as needed
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let db = if config.database.is_in_memory() {
            Database::open_in_memory()?
        } else {
            Database::open(Path::new(&config.database.path))?
        };
        db.set_busy_timeout(config.database.busy_timeout())?;
        info!(database = %config.database.path, "engine opened");

        Ok(Self {
            schema: SchemaStore::new(db.clone()),
            records: RecordStore::new(db.clone()),
            db,
            cache: SchemaCache::new(),
            config,
        })
    }

    /// Engine over a private in-memory database with default settings
    pub fn in_memory() -> EngineResult<Self> {
        Self::open(EngineConfig::in_memory())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn generator(&self) -> FormGenerator<'_, SchemaStore> {
        FormGenerator::new(&self.schema, &self.cache)
    }

    fn apply(&self, invalidation: &Invalidation) {
        let removed = self.cache.invalidate(invalidation);
        if removed > 0 {
            debug!(removed, "cache entries dropped");
        }
    }

    // ========================================================================
    // Entities
    // ========================================================================

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn create_entity(&self, input: NewEntity) -> EngineResult<Entity> {
        let mutation = self.schema.create_entity(input)?;
        self.apply(&mutation.invalidation);
        Ok(mutation.value)
    }

    #[instrument(skip(self, update))]
    pub fn update_entity(&self, entity_id: EntityId, update: EntityUpdate) -> EngineResult<Entity> {
        let mutation = self.schema.update_entity(entity_id, update)?;
        self.apply(&mutation.invalidation);
        Ok(mutation.value)
    }

    #[instrument(skip(self))]
    pub fn delete_entity(&self, entity_id: EntityId) -> EngineResult<()> {
        let invalidation = self
            .schema
            .delete_entity(entity_id, |invalidation| self.apply(invalidation))?;
        // drop anything recomputed while the row was being deleted
        self.apply(&invalidation);
        Ok(())
    }

    pub fn find_entity(&self, entity_id: EntityId) -> EngineResult<Entity> {
        self.schema.find_entity(entity_id)
    }

    pub fn find_entity_by_slug(&self, slug: &str) -> EngineResult<Entity> {
        self.schema.find_entity_by_slug(slug)
    }

    pub fn list_entities(&self) -> EngineResult<Vec<Entity>> {
        self.schema.list_entities()
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    #[instrument(skip(self, input), fields(name = %input.name, data_type = %input.data_type))]
    pub fn create_attribute(&self, input: NewAttribute) -> EngineResult<Attribute> {
        let mutation = self.schema.create_attribute(input)?;
        self.apply(&mutation.invalidation);
        Ok(mutation.value)
    }

    #[instrument(skip(self, update))]
    pub fn update_attribute(
        &self,
        attribute_id: AttributeId,
        update: AttributeUpdate,
    ) -> EngineResult<Attribute> {
        let mutation = self.schema.update_attribute(attribute_id, update)?;
        self.apply(&mutation.invalidation);
        Ok(mutation.value)
    }

    #[instrument(skip(self))]
    pub fn delete_attribute(&self, attribute_id: AttributeId) -> EngineResult<()> {
        let invalidation = self
            .schema
            .delete_attribute(attribute_id, |invalidation| self.apply(invalidation))?;
        self.apply(&invalidation);
        Ok(())
    }

    pub fn find_attribute(&self, attribute_id: AttributeId) -> EngineResult<Attribute> {
        self.schema.find_attribute(attribute_id)
    }

    pub fn find_attribute_by_slug(&self, slug: &str) -> EngineResult<Attribute> {
        self.schema.find_attribute_by_slug(slug)
    }

    pub fn list_attributes(&self) -> EngineResult<Vec<Attribute>> {
        self.schema.list_attributes()
    }

    /// Attached attributes, in attachment order
    pub fn attributes_for_entity(&self, entity_id: EntityId) -> EngineResult<Vec<Attribute>> {
        self.schema.find_entity(entity_id)?;
        Ok(self.generator().attributes(entity_id)?.as_ref().clone())
    }

    /// `true` if attached now, `false` if it already was
    #[instrument(skip(self))]
    pub fn attach_attribute(
        &self,
        attribute_id: AttributeId,
        entity_id: EntityId,
    ) -> EngineResult<bool> {
        let mutation = self.schema.attach_attribute(attribute_id, entity_id)?;
        self.apply(&mutation.invalidation);
        Ok(mutation.value)
    }

    /// `true` if detached now, `false` if it was not attached
    ///
    /// Stored values for the pair are kept but no longer read.
    #[instrument(skip(self))]
    pub fn detach_attribute(
        &self,
        attribute_id: AttributeId,
        entity_id: EntityId,
    ) -> EngineResult<bool> {
        let mutation = self.schema.detach_attribute(attribute_id, entity_id)?;
        self.apply(&mutation.invalidation);
        Ok(mutation.value)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    #[instrument(skip(self, input), fields(
        relation_type = %input.relation_type,
        from = input.from_entity_id,
        to = input.to_entity_id,
    ))]
    pub fn create_relationship(&self, input: NewRelationship) -> EngineResult<EntityRelationship> {
        let mutation = self.schema.create_relationship(input)?;
        self.apply(&mutation.invalidation);
        Ok(mutation.value)
    }

    #[instrument(skip(self))]
    pub fn delete_relationship(&self, relationship_id: RelationshipId) -> EngineResult<()> {
        let invalidation = self
            .schema
            .delete_relationship(relationship_id, |invalidation| self.apply(invalidation))?;
        self.apply(&invalidation);
        Ok(())
    }

    pub fn find_relationship(
        &self,
        relationship_id: RelationshipId,
    ) -> EngineResult<EntityRelationship> {
        self.schema.find_relationship(relationship_id)
    }

    pub fn list_relationships(&self) -> EngineResult<Vec<EntityRelationship>> {
        self.schema.list_relationships()
    }

    pub fn relationships_for_entity(
        &self,
        entity_id: EntityId,
    ) -> EngineResult<Vec<EntityRelationship>> {
        self.schema.find_entity(entity_id)?;
        self.schema.relationships_for_entity(entity_id)
    }

    // ========================================================================
    // Forms
    // ========================================================================

    #[instrument(skip(self))]
    pub fn generate_form_schema(
        &self,
        entity_id: EntityId,
        request: FormRequest,
    ) -> EngineResult<FormSchema> {
        self.schema.find_entity(entity_id)?;
        self.generator().form_schema(entity_id, request)
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Validate `data` against the entity's create rules and store it
    #[instrument(skip(self, data))]
    pub fn create_record(
        &self,
        slug: &str,
        data: &Map<String, Value>,
        created_by: Option<UserId>,
    ) -> EngineResult<RecordView> {
        let entity = self.schema.find_entity_by_slug(slug)?;
        let generator = self.generator();

        let rules = generator.validation_rules(entity.id, FormRequest::create())?;
        let validated = validate(&rules, data, &self.records)?;

        let attributes = generator.attributes(entity.id)?;
        let relationships: Vec<_> = generator
            .relationship_fields(entity.id)?
            .iter()
            .map(|field| field.relationship.clone())
            .collect();

        let record = self
            .records
            .create(&entity, &attributes, &relationships, &validated, created_by)?;
        self.read_record(&entity, record.id)
    }

    #[instrument(skip(self))]
    pub fn get_record(&self, slug: &str, record_id: RecordId) -> EngineResult<RecordView> {
        let entity = self.schema.find_entity_by_slug(slug)?;
        self.read_record(&entity, record_id)
    }

    fn read_record(&self, entity: &Entity, record_id: RecordId) -> EngineResult<RecordView> {
        let generator = self.generator();
        let view = self
            .records
            .find_by_id(entity, record_id, |entity_id| generator.attributes(entity_id))?;
        Ok(RecordView::new(view))
    }

    /// Records of an entity, newest first
    ///
    /// `page` defaults to 1; `per_page` defaults from the configuration and
    /// is clamped to `[1, max_per_page]`.
    #[instrument(skip(self))]
    pub fn list_records(
        &self,
        slug: &str,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> EngineResult<RecordPage> {
        let entity = self.schema.find_entity_by_slug(slug)?;
        let per_page = self.config.pagination.per_page(per_page);
        let page = page.unwrap_or(1).max(1);

        let records = self.records.index(&entity, per_page, page)?;
        let values = self.records.records_values(&entity, &records.items)?;
        let attributes = self.generator().attributes(entity.id)?;

        let data = records
            .items
            .iter()
            .map(|record| {
                let record_values = values.get(&record.id).map(Vec::as_slice).unwrap_or(&[]);
                RecordView::new(project(record, &attributes, record_values))
            })
            .collect();

        Ok(RecordPage {
            data,
            meta: PageMeta::from(&records),
        })
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.config.database.path)
            .field("cache", &self.cache.stats())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
