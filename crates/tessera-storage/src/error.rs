//! Storage error types for tessera-storage.
//!
//! [`StorageError`] covers engine failures plus every database-open-time
//! failure of the reconciler. All reconciler variants are fatal: the database
//! must not be used until the condition is resolved outside the process.

use thiserror::Error;

/// Errors produced by storage operations and schema reconciliation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization failed while fingerprinting the schema.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No contiguous chain of migration steps covers the version range.
    #[error("no migration path from version {from} to {to}: {reason}")]
    MigrationPath { from: u32, to: u32, reason: String },

    /// A migration step failed; the transaction was rolled back and the
    /// persisted version is unchanged.
    #[error("migration from version {from} to {to} failed: {reason}")]
    MigrationFailed { from: u32, to: u32, reason: String },

    /// A previously applied step no longer matches its recorded checksum.
    #[error("migration step {from} -> {to} was altered after it was applied")]
    MigrationTampered { from: u32, to: u32 },

    /// The persisted schema differs from the declared schema at the same
    /// version.
    #[error("persisted schema does not match the declared schema: {}", .differences.join("; "))]
    SchemaMismatch { differences: Vec<String> },

    /// The persisted version is newer than the declared one.
    #[error("database is at version {persisted}, newer than the declared version {declared}")]
    Downgrade { persisted: u32, declared: u32 },
}
