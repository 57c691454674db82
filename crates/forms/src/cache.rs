//! # Schema Cache
//!
//! Memoizes the artifacts derived from an entity's schema: attribute field
//! descriptors, validation rules, relationship fields and the attached
//! attribute list.
//!
//! Entries never expire. Every schema mutation returns an [`Invalidation`]
//! naming the entities it touched, and the caller applies it with
//! [`SchemaCache::invalidate`] before returning. Concurrent misses may compute
//! the same artifact twice; both results are identical, so the last writer
//! wins without harm.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use morphic_core::{EngineError, EngineResult, EntityId};
use morphic_schema::Attribute;
use tracing::debug;

use crate::field::{FieldDescriptor, RelationshipField};
use crate::rules::{FormMode, ValidationRules};

// ============================================================================
// Keys
// ============================================================================

/// Which derived artifact of an entity a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Fields,
    /// Rules depend on the request mode; the record being updated is
    /// applied after the read
    ValidationRules(FormMode),
    Relationships,
    Attributes,
}

impl ArtifactKind {
    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Fields => "fields",
            ArtifactKind::ValidationRules(_) => "validation_rules",
            ArtifactKind::Relationships => "relationships",
            ArtifactKind::Attributes => "attributes",
        }
    }
}

/// Structured cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_id: EntityId,
    pub artifact: ArtifactKind,
}

impl CacheKey {
    pub fn new(entity_id: EntityId, artifact: ArtifactKind) -> Self {
        Self {
            entity_id,
            artifact,
        }
    }

    pub fn fields(entity_id: EntityId) -> Self {
        Self::new(entity_id, ArtifactKind::Fields)
    }

    pub fn validation_rules(entity_id: EntityId, mode: FormMode) -> Self {
        Self::new(entity_id, ArtifactKind::ValidationRules(mode))
    }

    pub fn relationships(entity_id: EntityId) -> Self {
        Self::new(entity_id, ArtifactKind::Relationships)
    }

    pub fn attributes(entity_id: EntityId) -> Self {
        Self::new(entity_id, ArtifactKind::Attributes)
    }

    /// Flat string name, e.g. `entity_form_4_fields`
    pub fn legacy_name(&self) -> String {
        format!("entity_form_{}_{}", self.entity_id, self.artifact.suffix())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.artifact {
            ArtifactKind::ValidationRules(mode) => write!(f, "{}[{}]", self.legacy_name(), mode),
            ArtifactKind::Fields | ArtifactKind::Relationships | ArtifactKind::Attributes => {
                write!(f, "{}", self.legacy_name())
            }
        }
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// A cached value; cheap to clone
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Fields(Arc<Vec<FieldDescriptor>>),
    ValidationRules(Arc<ValidationRules>),
    Relationships(Arc<Vec<RelationshipField>>),
    Attributes(Arc<Vec<Attribute>>),
}

impl Artifact {
    fn kind_name(&self) -> &'static str {
        match self {
            Artifact::Fields(_) => "fields",
            Artifact::ValidationRules(_) => "validation_rules",
            Artifact::Relationships(_) => "relationships",
            Artifact::Attributes(_) => "attributes",
        }
    }

    fn mismatch(self, expected: &str) -> EngineError {
        EngineError::internal(format!(
            "cache entry holds {} where {} was expected",
            self.kind_name(),
            expected
        ))
    }

    pub fn into_fields(self) -> EngineResult<Arc<Vec<FieldDescriptor>>> {
        if let Artifact::Fields(fields) = self {
            Ok(fields)
        } else {
            Err(self.mismatch("fields"))
        }
    }

    pub fn into_validation_rules(self) -> EngineResult<Arc<ValidationRules>> {
        if let Artifact::ValidationRules(rules) = self {
            Ok(rules)
        } else {
            Err(self.mismatch("validation_rules"))
        }
    }

    pub fn into_relationships(self) -> EngineResult<Arc<Vec<RelationshipField>>> {
        if let Artifact::Relationships(fields) = self {
            Ok(fields)
        } else {
            Err(self.mismatch("relationships"))
        }
    }

    pub fn into_attributes(self) -> EngineResult<Arc<Vec<Attribute>>> {
        if let Artifact::Attributes(attributes) = self {
            Ok(attributes)
        } else {
            Err(self.mismatch("attributes"))
        }
    }
}

// ============================================================================
// Invalidation
// ============================================================================

/// Entities whose cached artifacts a mutation made stale
#[must_use = "apply the invalidation to the schema cache"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    entities: BTreeSet<EntityId>,
}

impl Invalidation {
    /// Nothing to invalidate
    pub fn none() -> Self {
        Self::default()
    }

    pub fn entity(entity_id: EntityId) -> Self {
        Self::entities([entity_id])
    }

    pub fn entities(entity_ids: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            entities: entity_ids.into_iter().collect(),
        }
    }

    pub fn add(&mut self, entity_id: EntityId) {
        self.entities.insert(entity_id);
    }

    pub fn merge(mut self, other: Invalidation) -> Self {
        self.entities.extend(other.entities);
        self
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.entities.contains(&entity_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }
}

// ============================================================================
// SchemaCache
// ============================================================================

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Thread-safe, never-expiring artifact cache
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<CacheKey, Artifact>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached artifact, if present
    pub fn get(&self, key: &CacheKey) -> Option<Artifact> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Cached artifact, or compute, store and return it
    ///
    /// The lock is not held while `compute` runs. A failed computation
    /// caches nothing.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> EngineResult<Artifact>
    where
        F: FnOnce() -> EngineResult<Artifact>,
    {
        if let Some(artifact) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "schema cache hit");
            return Ok(artifact);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "schema cache miss");

        let artifact = compute()?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, artifact.clone());
        Ok(artifact)
    }

    /// Drop every artifact of every entity in `invalidation`
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, invalidation: &Invalidation) -> usize {
        if invalidation.is_empty() {
            return 0;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !invalidation.contains(key.entity_id));
        let removed = before - entries.len();

        for entity_id in invalidation.iter() {
            debug!(
                entity_id,
                keys = ?[
                    CacheKey::fields(entity_id).legacy_name(),
                    CacheKey::validation_rules(entity_id, FormMode::Create).legacy_name(),
                    CacheKey::relationships(entity_id).legacy_name(),
                    CacheKey::attributes(entity_id).legacy_name(),
                ],
                "schema cache invalidated"
            );
        }
        removed
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn rules_artifact() -> Artifact {
        let mut rules = ValidationRules::new();
        rules.insert("title", vec![Rule::Required, Rule::String]);
        Artifact::ValidationRules(Arc::new(rules))
    }

    #[test]
    fn test_legacy_names() {
        assert_eq!(CacheKey::fields(4).legacy_name(), "entity_form_4_fields");
        assert_eq!(
            CacheKey::validation_rules(4, FormMode::Patch).legacy_name(),
            "entity_form_4_validation_rules"
        );
        assert_eq!(
            CacheKey::relationships(4).legacy_name(),
            "entity_form_4_relationships"
        );
        assert_eq!(CacheKey::attributes(4).legacy_name(), "entity_form_4_attributes");
        assert_eq!(
            CacheKey::validation_rules(4, FormMode::Patch).to_string(),
            "entity_form_4_validation_rules[patch]"
        );
    }

    #[test]
    fn test_memoizes() {
        let cache = SchemaCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(Artifact::Fields(Arc::new(Vec::new())))
        };

        cache.get_or_compute(CacheKey::fields(1), compute).unwrap();
        cache.get_or_compute(CacheKey::fields(1), compute).unwrap();

        assert_eq!(calls.get(), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_rules_keyed_by_mode() {
        let cache = SchemaCache::new();
        cache
            .get_or_compute(CacheKey::validation_rules(1, FormMode::Create), || {
                Ok(rules_artifact())
            })
            .unwrap();
        assert!(
            cache
                .get(&CacheKey::validation_rules(1, FormMode::Replace))
                .is_none()
        );
        assert!(
            cache
                .get(&CacheKey::validation_rules(1, FormMode::Create))
                .is_some()
        );
    }

    #[test]
    fn test_failed_compute_not_cached() {
        let cache = SchemaCache::new();
        let result = cache.get_or_compute(CacheKey::fields(1), || {
            Err(EngineError::EntityNotFound(1))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_drops_all_kinds_of_listed_entities() {
        let cache = SchemaCache::new();
        for entity_id in [1, 2] {
            cache
                .get_or_compute(CacheKey::fields(entity_id), || {
                    Ok(Artifact::Fields(Arc::new(Vec::new())))
                })
                .unwrap();
            cache
                .get_or_compute(CacheKey::attributes(entity_id), || {
                    Ok(Artifact::Attributes(Arc::new(Vec::new())))
                })
                .unwrap();
            cache
                .get_or_compute(
                    CacheKey::validation_rules(entity_id, FormMode::Patch),
                    || Ok(rules_artifact()),
                )
                .unwrap();
        }
        assert_eq!(cache.len(), 6);

        let removed = cache.invalidate(&Invalidation::entity(1));
        assert_eq!(removed, 3);
        assert!(cache.get(&CacheKey::fields(1)).is_none());
        assert!(cache.get(&CacheKey::fields(2)).is_some());

        assert_eq!(cache.invalidate(&Invalidation::none()), 0);
    }

    #[test]
    fn test_invalidation_merge() {
        let invalidation = Invalidation::entity(1).merge(Invalidation::entities([2, 1]));
        assert_eq!(invalidation.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(invalidation.contains(2));
    }

    #[test]
    fn test_artifact_mismatch_is_internal_error() {
        let err = rules_artifact().into_fields().unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert!(rules_artifact().into_validation_rules().is_ok());
    }
}
