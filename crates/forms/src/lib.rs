//! # Morphic Forms
//!
//! Form and validation schema generation for Morphic entities.
//!
//! An entity has no compiled-in shape, so everything a client needs to build
//! and check a record form is derived at request time from the entity's
//! attached attributes and relationships, then memoized in the
//! [`SchemaCache`] until a schema mutation invalidates it.
//!
//! ## Modules
//!
//! - [`field`]: attribute and relationship field descriptors
//! - [`rules`]: rule values and the per-request [`FormRequest`]
//! - [`generator`]: cached, read-through [`FormGenerator`]
//! - [`validator`]: evaluates rules against submitted data
//! - [`cache`]: the [`SchemaCache`] and its [`Invalidation`] sets
//!

pub mod cache;
pub mod field;
pub mod generator;
pub mod rules;
pub mod validator;

pub use cache::{Artifact, ArtifactKind, CacheKey, CacheStats, Invalidation, SchemaCache};
pub use field::{FieldDescriptor, FieldType, RelationshipField};
pub use generator::{FormGenerator, FormSchema, attribute_rules, build_rules, relationship_rules};
pub use rules::{FormMode, FormRequest, Rule, ValidationRules, element_key};
pub use validator::{RuleContext, validate};
