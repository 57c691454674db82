//! SQLite connection and table layout
//!
//! One `rusqlite::Connection` is shared behind `Arc<Mutex<_>>`. Every
//! operation takes the lock for its own duration, so callers never hold it
//! across calls into other components.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use morphic_core::{EngineError, EngineResult};
use rusqlite::{Connection, Transaction};
use tracing::debug;

/// Tables created by [`Database::init_schema`], in dependency order
pub const TABLES: &[&str] = &[
    "entities",
    "attributes",
    "attribute_entity",
    "entity_relationships",
    "records",
    "entity_values",
    "record_relationships",
];

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        description TEXT,
        created_by INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS attributes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        data_type TEXT NOT NULL,
        is_required INTEGER NOT NULL DEFAULT 0,
        is_unique INTEGER NOT NULL DEFAULT 0,
        default_value TEXT,
        created_by INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS attribute_entity (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        attribute_id INTEGER NOT NULL REFERENCES attributes(id) ON DELETE CASCADE,
        entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        UNIQUE(attribute_id, entity_id)
    );

    CREATE TABLE IF NOT EXISTS entity_relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        inverse_name TEXT NOT NULL,
        from_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        to_entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_entity_relationships_from
        ON entity_relationships(from_entity_id);
    CREATE INDEX IF NOT EXISTS idx_entity_relationships_to
        ON entity_relationships(to_entity_id);

    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        created_by INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_records_entity
        ON records(entity_id, created_at);

    CREATE TABLE IF NOT EXISTS entity_values (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        attribute_id INTEGER NOT NULL REFERENCES attributes(id) ON DELETE CASCADE,
        value TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entity_values_record
        ON entity_values(record_id);
    CREATE INDEX IF NOT EXISTS idx_entity_values_lookup
        ON entity_values(entity_id, attribute_id, value);

    CREATE TABLE IF NOT EXISTS record_relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        relationship_id INTEGER NOT NULL REFERENCES entity_relationships(id) ON DELETE CASCADE,
        from_record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        to_record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_record_relationships_from
        ON record_relationships(from_record_id);
    CREATE INDEX IF NOT EXISTS idx_record_relationships_to
        ON record_relationships(to_record_id);
";

// ============================================================================
// Database
// ============================================================================

/// Shared handle to the SQLite database
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and ensure the tables exist
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            EngineError::Storage(format!(
                "failed to open database '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "opened database");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            EngineError::Storage(format!("failed to open in-memory database: {}", e))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> EngineResult<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Enable foreign keys and create missing tables
    fn init_schema(&self) -> EngineResult<()> {
        self.with_connection(|conn| {
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.execute_batch(SCHEMA).map_err(|e| {
                EngineError::Storage(format!("failed to initialize schema: {}", e))
            })?;
            Ok(())
        })
    }

    /// How long a statement waits on a locked database file
    pub fn set_busy_timeout(&self, timeout: Duration) -> EngineResult<()> {
        self.with_connection(|conn| Ok(conn.busy_timeout(timeout)?))
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::internal("database connection lock poisoned"))
    }

    /// Run `f` with the connection locked
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one transaction; any error rolls everything back
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| EngineError::Transaction(e.to_string()))?;
        Ok(value)
    }

    /// Number of rows in one of the known tables
    pub fn row_count(&self, table: &str) -> EngineResult<u64> {
        if !TABLES.contains(&table) {
            return Err(EngineError::validation(format!("Unknown table '{}'", table)));
        }
        self.with_connection(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(count as u64)
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Current time, truncated to the microsecond precision that is stored
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::parse_from_rfc3339(&now.to_rfc3339_opts(SecondsFormat::Micros, true))
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Whether an error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ============================================================================
// Tests
// ============================================================================
