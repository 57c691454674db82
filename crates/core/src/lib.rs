//! # Morphic Core
//!
//! Core types, traits, and error handling for Morphic.
//!
//! This crate provides the foundational building blocks used throughout
//! the Morphic workspace, including:
//!
//! - **Types**: row identifiers, attribute data types, relationship cardinalities
//! - **Traits**: `Validatable`, implemented by schema inputs and configuration
//! - **Errors**: unified error handling with `EngineError` and `EngineResult`
//!

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{EngineError, EngineResult, ValidationErrors};
pub use traits::Validatable;
pub use types::{
    AttributeId, DataType, EntityId, RecordId, RelationType, RelationshipId, Timestamp, UserId,
    to_stored_text,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
