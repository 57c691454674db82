//! # Form Generator
//!
//! Derives an entity's form schema from its current definition:
//!
//! - one [`FieldDescriptor`] per attached attribute
//! - one [`RelationshipField`] per relationship edge touching the entity
//! - a [`ValidationRules`] set covering both
//!
//! Every artifact is read through the [`SchemaCache`], so repeated calls
//! for an unchanged entity do not touch the schema source.

use std::sync::Arc;

use morphic_core::{EngineResult, EntityId};
use morphic_schema::{Attribute, SchemaSource, resolve};
use serde::Serialize;
use tracing::warn;

use crate::cache::{Artifact, CacheKey, SchemaCache};
use crate::field::{FieldDescriptor, RelationshipField};
use crate::rules::{FormRequest, Rule, ValidationRules, element_key};

// ============================================================================
// FormSchema
// ============================================================================

/// Everything a client needs to render and validate an entity form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormSchema {
    pub fields: Vec<FieldDescriptor>,
    pub validation_rules: ValidationRules,
    pub relationship_fields: Vec<RelationshipField>,
}

// ============================================================================
// Rule generation
// ============================================================================

/// Rules for one attribute of `entity_id`
///
/// Presence comes first, then the type rule, then uniqueness.
pub fn attribute_rules(entity_id: EntityId, attribute: &Attribute, request: FormRequest) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(3);

    if attribute.is_required && request.mode.enforces_required() {
        rules.push(Rule::Required);
    } else {
        rules.push(Rule::Nullable);
    }

    rules.push(Rule::for_data_type(attribute.data_type));

    if attribute.is_unique {
        rules.push(Rule::Unique {
            entity_id,
            attribute_id: attribute.id,
            ignore_record: request.ignore_record(),
        });
    }

    rules
}

/// Rules for one relationship field, keyed by field name
///
/// Multiple-valued fields get a second entry under `{name}.*` that applies
/// to each submitted id.
pub fn relationship_rules(field: &RelationshipField) -> Vec<(String, Vec<Rule>)> {
    let exists = Rule::Exists {
        entity_id: field.relationship.related_entity_id,
    };

    if field.multiple() {
        vec![
            (
                field.name().to_string(),
                vec![Rule::Nullable, Rule::Array, Rule::Min(0)],
            ),
            (element_key(field.name()), vec![Rule::Integer, exists]),
        ]
    } else {
        vec![(
            field.name().to_string(),
            vec![Rule::Nullable, Rule::Integer, exists],
        )]
    }
}

/// Build the full rule set from attributes and relationship fields
///
/// A relationship field shadows an attribute with the same name.
pub fn build_rules(
    entity_id: EntityId,
    attributes: &[Attribute],
    relationship_fields: &[RelationshipField],
    request: FormRequest,
) -> ValidationRules {
    let mut rules = ValidationRules::new();
    for attribute in attributes {
        rules.insert(
            attribute.slug.clone(),
            attribute_rules(entity_id, attribute, request),
        );
    }
    for field in relationship_fields {
        for (key, field_rules) in relationship_rules(field) {
            rules.insert(key, field_rules);
        }
    }
    rules
}

// ============================================================================
// FormGenerator
// ============================================================================

/// Cached, read-through generator over a schema source
pub struct FormGenerator<'a, S: SchemaSource + ?Sized> {
    source: &'a S,
    cache: &'a SchemaCache,
}

impl<'a, S: SchemaSource + ?Sized> FormGenerator<'a, S> {
    pub fn new(source: &'a S, cache: &'a SchemaCache) -> Self {
        Self { source, cache }
    }

    /// Attributes currently attached to the entity
    pub fn attributes(&self, entity_id: EntityId) -> EngineResult<Arc<Vec<Attribute>>> {
        self.cache
            .get_or_compute(CacheKey::attributes(entity_id), || {
                let attributes = self.source.attributes_for_entity(entity_id)?;
                Ok(Artifact::Attributes(Arc::new(attributes)))
            })?
            .into_attributes()
    }

    /// One descriptor per attached attribute
    pub fn fields(&self, entity_id: EntityId) -> EngineResult<Arc<Vec<FieldDescriptor>>> {
        self.cache
            .get_or_compute(CacheKey::fields(entity_id), || {
                let attributes = self.attributes(entity_id)?;
                let fields = attributes.iter().map(FieldDescriptor::from).collect();
                Ok(Artifact::Fields(Arc::new(fields)))
            })?
            .into_fields()
    }

    /// One field per relationship edge touching the entity
    pub fn relationship_fields(
        &self,
        entity_id: EntityId,
    ) -> EngineResult<Arc<Vec<RelationshipField>>> {
        self.cache
            .get_or_compute(CacheKey::relationships(entity_id), || {
                let relationships = self.source.relationships_for_entity(entity_id)?;
                let mut fields = Vec::with_capacity(relationships.len());

                for resolved in resolve(entity_id, &relationships) {
                    match self.source.entity(resolved.related_entity_id) {
                        Ok(related) => fields.push(RelationshipField::new(resolved, related.slug)),
                        Err(err) if err.is_not_found() => {
                            warn!(
                                entity_id,
                                relationship_id = resolved.relationship_id,
                                related_entity_id = resolved.related_entity_id,
                                "skipping relationship to missing entity"
                            );
                        }
                        Err(err) => return Err(err),
                    }
                }

                Ok(Artifact::Relationships(Arc::new(fields)))
            })?
            .into_relationships()
    }

    /// Rules for the given request
    ///
    /// One rule set is cached per mode. The record being updated is filled
    /// into the `unique` rules of a copy, so update forms do not add entries.
    pub fn validation_rules(
        &self,
        entity_id: EntityId,
        request: FormRequest,
    ) -> EngineResult<Arc<ValidationRules>> {
        let cached = self
            .cache
            .get_or_compute(CacheKey::validation_rules(entity_id, request.mode), || {
                let attributes = self.attributes(entity_id)?;
                let relationship_fields = self.relationship_fields(entity_id)?;
                let unscoped = FormRequest {
                    record_id: None,
                    ..request
                };
                let rules = build_rules(entity_id, &attributes, &relationship_fields, unscoped);
                Ok(Artifact::ValidationRules(Arc::new(rules)))
            })?
            .into_validation_rules()?;

        match request.ignore_record() {
            Some(record_id) => {
                let mut rules = cached.as_ref().clone();
                rules.ignore_record(Some(record_id));
                Ok(Arc::new(rules))
            }
            None => Ok(cached),
        }
    }

    /// All three artifacts together
    pub fn form_schema(&self, entity_id: EntityId, request: FormRequest) -> EngineResult<FormSchema> {
        Ok(FormSchema {
            fields: self.fields(entity_id)?.as_ref().clone(),
            validation_rules: self.validation_rules(entity_id, request)?.as_ref().clone(),
            relationship_fields: self.relationship_fields(entity_id)?.as_ref().clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Invalidation;
    use chrono::Utc;
    use morphic_core::{DataType, EngineError, RelationType};
    use morphic_schema::{Entity, EntityRelationship};
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    const ARTICLE: EntityId = 1;
    const TAG: EntityId = 2;

    #[derive(Default)]
    struct MemorySource {
        entities: HashMap<EntityId, Entity>,
        attributes: RefCell<HashMap<EntityId, Vec<Attribute>>>,
        relationships: Vec<EntityRelationship>,
        attribute_reads: Cell<usize>,
    }

    impl MemorySource {
        fn with_entity(mut self, id: EntityId, slug: &str) -> Self {
            self.entities.insert(
                id,
                Entity {
                    id,
                    name: slug.to_string(),
                    slug: slug.to_string(),
                    description: None,
                    created_by: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
            );
            self
        }

        fn attach(&self, entity_id: EntityId, attribute: Attribute) {
            self.attributes
                .borrow_mut()
                .entry(entity_id)
                .or_default()
                .push(attribute);
        }

        fn detach(&self, entity_id: EntityId, attribute_id: i64) {
            if let Some(list) = self.attributes.borrow_mut().get_mut(&entity_id) {
                list.retain(|a| a.id != attribute_id);
            }
        }
    }

    impl SchemaSource for MemorySource {
        fn entity(&self, entity_id: EntityId) -> EngineResult<Entity> {
            self.entities
                .get(&entity_id)
                .cloned()
                .ok_or(EngineError::EntityNotFound(entity_id))
        }

        fn attributes_for_entity(&self, entity_id: EntityId) -> EngineResult<Vec<Attribute>> {
            self.attribute_reads.set(self.attribute_reads.get() + 1);
            Ok(self
                .attributes
                .borrow()
                .get(&entity_id)
                .cloned()
                .unwrap_or_default())
        }

        fn relationships_for_entity(
            &self,
            entity_id: EntityId,
        ) -> EngineResult<Vec<EntityRelationship>> {
            Ok(self
                .relationships
                .iter()
                .filter(|r| r.touches(entity_id))
                .cloned()
                .collect())
        }
    }

    fn attribute(id: i64, slug: &str, data_type: DataType, required: bool, unique: bool) -> Attribute {
        Attribute {
            id,
            name: slug.to_string(),
            slug: slug.to_string(),
            data_type,
            is_required: required,
            is_unique: unique,
            default_value: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn article_tags() -> EntityRelationship {
        EntityRelationship {
            id: 10,
            relation_type: RelationType::OneToMany,
            name: "article_tags".to_string(),
            inverse_name: "tag_article".to_string(),
            from_entity_id: ARTICLE,
            to_entity_id: TAG,
        }
    }

    fn source() -> MemorySource {
        let mut source = MemorySource::default()
            .with_entity(ARTICLE, "article")
            .with_entity(TAG, "tag");
        source.relationships.push(article_tags());
        source.attach(ARTICLE, attribute(1, "title", DataType::String, true, true));
        source.attach(ARTICLE, attribute(2, "price", DataType::Float, false, false));
        source
    }

    #[test]
    fn test_attribute_rules_by_mode() {
        let title = attribute(1, "title", DataType::String, true, true);

        assert_eq!(
            attribute_rules(ARTICLE, &title, FormRequest::create()),
            vec![
                Rule::Required,
                Rule::String,
                Rule::Unique {
                    entity_id: ARTICLE,
                    attribute_id: 1,
                    ignore_record: None
                }
            ]
        );
        assert_eq!(
            attribute_rules(ARTICLE, &title, FormRequest::replace(7))[0],
            Rule::Required
        );
        assert_eq!(
            attribute_rules(ARTICLE, &title, FormRequest::patch(7)),
            vec![
                Rule::Nullable,
                Rule::String,
                Rule::Unique {
                    entity_id: ARTICLE,
                    attribute_id: 1,
                    ignore_record: Some(7)
                }
            ]
        );
    }

    #[test]
    fn test_type_rules() {
        let cases = [
            (DataType::String, Rule::String),
            (DataType::Integer, Rule::Integer),
            (DataType::Float, Rule::Numeric),
            (DataType::Date, Rule::Date),
            (DataType::Boolean, Rule::Boolean),
        ];
        for (data_type, expected) in cases {
            let attr = attribute(1, "x", data_type, false, false);
            assert_eq!(
                attribute_rules(ARTICLE, &attr, FormRequest::create()),
                vec![Rule::Nullable, expected]
            );
        }
    }

    #[test]
    fn test_fields_match_attached_attributes() {
        let source = source();
        let cache = SchemaCache::new();
        let generator = FormGenerator::new(&source, &cache);

        let fields = generator.fields(ARTICLE).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "title");
        assert_eq!(fields[1].name, "price");
        assert!(generator.fields(TAG).unwrap().is_empty());
    }

    #[test]
    fn test_relationship_fields_both_sides() {
        let source = source();
        let cache = SchemaCache::new();
        let generator = FormGenerator::new(&source, &cache);

        let article_side = generator.relationship_fields(ARTICLE).unwrap();
        assert_eq!(article_side.len(), 1);
        assert_eq!(article_side[0].name(), "article_tags");
        assert_eq!(article_side[0].related_entity, "tag");
        assert!(article_side[0].multiple());

        let tag_side = generator.relationship_fields(TAG).unwrap();
        assert_eq!(tag_side[0].name(), "tag_article");
        assert_eq!(tag_side[0].related_entity, "article");
        assert!(!tag_side[0].multiple());
        assert!(!tag_side[0].relationship.is_source);
    }

    #[test]
    fn test_validation_rules_include_relationships() {
        let source = source();
        let cache = SchemaCache::new();
        let generator = FormGenerator::new(&source, &cache);

        let rules = generator.validation_rules(ARTICLE, FormRequest::create()).unwrap();
        assert_eq!(
            rules.get("article_tags"),
            Some(&[Rule::Nullable, Rule::Array, Rule::Min(0)][..])
        );
        assert_eq!(
            rules.get("article_tags.*"),
            Some(&[Rule::Integer, Rule::Exists { entity_id: TAG }][..])
        );
        assert_eq!(rules.get("price"), Some(&[Rule::Nullable, Rule::Numeric][..]));

        let rules = generator.validation_rules(TAG, FormRequest::create()).unwrap();
        assert_eq!(
            rules.get("tag_article"),
            Some(&[Rule::Nullable, Rule::Integer, Rule::Exists { entity_id: ARTICLE }][..])
        );
        assert!(!rules.contains("tag_article.*"));
    }

    #[test]
    fn test_reads_are_cached_until_invalidated() {
        let source = source();
        let cache = SchemaCache::new();
        let generator = FormGenerator::new(&source, &cache);

        assert_eq!(generator.fields(ARTICLE).unwrap().len(), 2);
        generator.validation_rules(ARTICLE, FormRequest::create()).unwrap();
        assert_eq!(source.attribute_reads.get(), 1);

        source.detach(ARTICLE, 2);
        // stale until the mutation's invalidation is applied
        assert_eq!(generator.fields(ARTICLE).unwrap().len(), 2);

        cache.invalidate(&Invalidation::entity(ARTICLE));
        let fields = generator.fields(ARTICLE).unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields.iter().all(|f| f.name != "price"));
        assert_eq!(source.attribute_reads.get(), 2);
    }

    #[test]
    fn test_update_rules_share_one_entry_per_mode() {
        let source = source();
        let cache = SchemaCache::new();
        let generator = FormGenerator::new(&source, &cache);

        let unique = |rules: &ValidationRules| rules.get("title").unwrap()[2].clone();
        let title_unique = |ignore_record| Rule::Unique {
            entity_id: ARTICLE,
            attribute_id: 1,
            ignore_record,
        };

        for record_id in 1..=50 {
            let rules = generator
                .validation_rules(ARTICLE, FormRequest::replace(record_id))
                .unwrap();
            assert_eq!(unique(rules.as_ref()), title_unique(Some(record_id)));
        }
        let rules = generator.validation_rules(ARTICLE, FormRequest::create()).unwrap();
        assert_eq!(unique(rules.as_ref()), title_unique(None));

        // attributes, relationships and one rule set per mode
        assert_eq!(cache.len(), 4);
        assert_eq!(source.attribute_reads.get(), 1);
    }

    #[test]
    fn test_relationship_shadows_attribute_rules() {
        let source = source();
        source.attach(ARTICLE, attribute(3, "article_tags", DataType::String, true, false));
        let cache = SchemaCache::new();
        let generator = FormGenerator::new(&source, &cache);

        let rules = generator.validation_rules(ARTICLE, FormRequest::create()).unwrap();
        assert_eq!(rules.get("article_tags").unwrap()[0], Rule::Nullable);
    }

    #[test]
    fn test_form_schema_serializes() {
        let source = source();
        let cache = SchemaCache::new();
        let schema = FormGenerator::new(&source, &cache)
            .form_schema(ARTICLE, FormRequest::create())
            .unwrap();

        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["fields"].as_array().unwrap().len(), 2);
        assert_eq!(
            value["validation_rules"]["title"],
            serde_json::json!([
                "required",
                "string",
                "unique:entity_values,value,NULL,record_id,entity_id,1,attribute_id,1"
            ])
        );
        assert_eq!(value["relationship_fields"][0]["name"], "article_tags");
    }
}
