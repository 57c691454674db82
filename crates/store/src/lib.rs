//! # Morphic Store
//!
//! SQLite persistence for Morphic.
//!
//! - [`database`]: connection handle, table layout, transactions
//! - [`schema_store`]: entities, attributes, attachments, relationship definitions
//! - [`record_store`]: records, their typed values and record-to-record edges
//!
//! Schema mutations return [`Mutation`] / [`Invalidation`] values so the
//! caller can keep the form cache consistent.

pub mod database;
pub mod record_store;
pub mod schema_store;

pub use database::{Database, TABLES};
pub use record_store::{Page, RecordStore, format_timestamp, project};
pub use schema_store::{Mutation, SchemaStore};

pub use morphic_forms::Invalidation;
