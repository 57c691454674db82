//! # Morphic Engine
//!
//! The public operation surface of Morphic: entity, attribute and
//! relationship management, form schema generation and record
//! create/read/list, over one SQLite database.
//!
//! ```rust,ignore
//! use morphic_engine::{Engine, EngineConfig};
//! use morphic_engine::schema::{NewAttribute, NewEntity};
//!
//! let engine = Engine::open(EngineConfig::in_memory())?;
//! let article = engine.create_entity(NewEntity::new("Article"))?;
//! let title = engine.create_attribute(NewAttribute::string("Title").required())?;
//! engine.attach_attribute(title.id, article.id)?;
//! ```

pub mod config;
pub mod engine;
pub mod view;

pub use config::{DatabaseConfig, EngineConfig, LoggingConfig, PaginationConfig};
pub use engine::Engine;
pub use view::{PageMeta, RecordPage, RecordView};

pub use morphic_core as core;
pub use morphic_forms as forms;
pub use morphic_schema as schema;
