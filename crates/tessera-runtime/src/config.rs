//! Database configuration.
//!
//! [`DatabaseConfig::from_env`] reads:
//! - `TESSERA_DB_PATH`: database file path (default: "tessera.db")
//! - `TESSERA_READERS`: number of read-only connections (default: 4)
//! - `TESSERA_SCHEMA_VALIDATION`: `off`, `identity` or `structural`
//!   (default: `identity`)

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_storage::{ReconcileOptions, SchemaValidation};

use crate::error::RuntimeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Read-only connections serving concurrent reads. File databases only;
    /// with zero readers every read goes through the writer.
    pub reader_connections: usize,
    pub busy_timeout_ms: u64,
    pub schema_validation: SchemaValidation,
    pub destructive_fallback: bool,
    /// Rows buffered ahead of a lazy result stream's consumer.
    pub stream_buffer: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: None,
            reader_connections: 4,
            busy_timeout_ms: 5_000,
            schema_validation: SchemaValidation::Identity,
            destructive_fallback: false,
            stream_buffer: 64,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        DatabaseConfig::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        DatabaseConfig {
            path: Some(path.into()),
            ..DatabaseConfig::default()
        }
    }

    pub fn from_env() -> Result<Self, RuntimeError> {
        let path = std::env::var("TESSERA_DB_PATH").unwrap_or_else(|_| "tessera.db".to_string());
        let mut config = DatabaseConfig::file(path);
        if let Ok(readers) = std::env::var("TESSERA_READERS") {
            config.reader_connections = readers
                .parse()
                .map_err(|_| RuntimeError::Config(format!("TESSERA_READERS must be a count, got '{}'", readers)))?;
        }
        if let Ok(mode) = std::env::var("TESSERA_SCHEMA_VALIDATION") {
            config.schema_validation = mode.parse().map_err(RuntimeError::Config)?;
        }
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            validation: self.schema_validation,
            destructive_fallback: self.destructive_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_with_identity_checks() {
        let config = DatabaseConfig::default();
        assert!(config.path.is_none());
        assert_eq!(config.schema_validation, SchemaValidation::Identity);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"path": "shop.db", "schema_validation": "structural"}"#).unwrap();
        assert_eq!(config.path, Some(PathBuf::from("shop.db")));
        assert_eq!(config.schema_validation, SchemaValidation::Structural);
        assert_eq!(config.reader_connections, 4);
        assert!(!config.reconcile_options().destructive_fallback);
    }
}
