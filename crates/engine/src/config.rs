//! Engine configuration
//!
//! Loaded from a TOML file (`morphic.toml` by default), then overridden by
//! environment variables. Every section and key is optional.
//!
//! ```toml
//! [database]
//! path = "morphic.db"
//! busy_timeout_ms = 5000
//!
//! [pagination]
//! default_per_page = 15
//! max_per_page = 100
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use morphic_core::{EngineError, EngineResult, Validatable};
use serde::{Deserialize, Serialize};

/// Default configuration file name
pub const CONFIG_FILE: &str = "morphic.toml";

/// Overrides `database.path`
pub const ENV_DATABASE: &str = "MORPHIC_DATABASE";

/// Overrides `logging.level`
pub const ENV_LOG: &str = "MORPHIC_LOG";

/// Database path selecting a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

// ============================================================================
// EngineConfig
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub pagination: PaginationConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with an in-memory database
    pub fn in_memory() -> Self {
        Self::default().with_database_path(IN_MEMORY)
    }

    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database.path = path.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::FileRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if given, else `morphic.toml` in `dir` if present, else defaults
    pub fn discover(path: Option<&Path>, dir: impl AsRef<Path>) -> EngineResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let candidate = dir.as_ref().join(CONFIG_FILE);
                if candidate.is_file() {
                    Self::load(candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            self.database.path = path;
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }
        self
    }

    /// Apply overrides from the process environment
    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }
}

impl Validatable for EngineConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "database.path cannot be empty".to_string(),
            ));
        }
        if self.pagination.default_per_page == 0 {
            return Err(EngineError::InvalidConfig(
                "pagination.default_per_page must be at least 1".to_string(),
            ));
        }
        if self.pagination.max_per_page < self.pagination.default_per_page {
            return Err(EngineError::InvalidConfig(format!(
                "pagination.max_per_page ({}) is below default_per_page ({})",
                self.pagination.max_per_page, self.pagination.default_per_page
            )));
        }
        if self.logging.level.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "logging.level cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`
    pub path: String,

    /// How long a statement waits on a locked database file
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "morphic.db".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_per_page: u64,
    pub max_per_page: u64,
}

impl PaginationConfig {
    /// Requested page size, defaulted and clamped to `[1, max_per_page]`
    pub fn per_page(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_per_page)
            .clamp(1, self.max_per_page.max(1))
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: 15,
            max_per_page: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.database.path, "morphic.db");
        assert_eq!(config.pagination.default_per_page, 15);
        assert_eq!(config.pagination.max_per_page, 100);
        assert_eq!(config.logging.level, "info");
        assert!(config.is_valid());
        assert!(EngineConfig::in_memory().database.is_in_memory());
    }

    #[test]
    fn test_partial_file() {
        let config = EngineConfig::from_toml_str(
            r#"
            [pagination]
            default_per_page = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.pagination.default_per_page, 5);
        assert_eq!(config.pagination.max_per_page, 100);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_invalid_file() {
        let err = EngineConfig::from_toml_str("[pagination]\ndefault_per_page = \"x\"").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));

        let err = EngineConfig::from_toml_str(
            "[pagination]\ndefault_per_page = 50\nmax_per_page = 10",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_load_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            EngineConfig::discover(None, dir.path()).unwrap(),
            EngineConfig::default()
        );

        let config = EngineConfig::default()
            .with_database_path("data/app.db")
            .with_log_level("debug");
        std::fs::write(dir.path().join(CONFIG_FILE), config.to_toml_string().unwrap()).unwrap();

        assert_eq!(EngineConfig::discover(None, dir.path()).unwrap(), config);
        assert_eq!(
            EngineConfig::load(dir.path().join(CONFIG_FILE)).unwrap(),
            config
        );

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            EngineConfig::discover(Some(&missing), dir.path()).unwrap_err(),
            EngineError::FileRead { .. }
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_DATABASE, ":memory:"), (ENV_LOG, "morphic=trace")]);
        let config = EngineConfig::default()
            .with_env_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert!(config.database.is_in_memory());
        assert_eq!(config.logging.level, "morphic=trace");

        let blank = EngineConfig::default().with_env_overrides(|_| Some("  ".to_string()));
        assert_eq!(blank, EngineConfig::default());
    }

    #[test]
    fn test_per_page_clamp() {
        let pagination = PaginationConfig::default();
        assert_eq!(pagination.per_page(None), 15);
        assert_eq!(pagination.per_page(Some(0)), 1);
        assert_eq!(pagination.per_page(Some(20)), 20);
        assert_eq!(pagination.per_page(Some(1_000)), 100);
    }
}
