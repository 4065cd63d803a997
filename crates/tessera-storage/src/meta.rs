//! Persisted metadata: schema version, identity hash and applied steps.
//!
//! The version lives in SQLite's `user_version` pragma, so `0` means "never
//! created". The identity hash and the per-step checksums live in two
//! bookkeeping tables created alongside the schema.

use rusqlite::{params, Connection, OptionalExtension};
use tessera_core::migration::MigrationStep;

use crate::error::StorageError;
use crate::hash::step_checksum;

pub const MASTER_TABLE: &str = "tessera_master";
pub const MIGRATIONS_TABLE: &str = "tessera_migrations";

/// Fixed row id of the single identity record.
const IDENTITY_ROW: i64 = 42;

/// A migration step recorded as applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedStep {
    pub from: u32,
    pub to: u32,
    pub checksum: String,
}

/// Reads the persisted schema version; `None` if the schema was never
/// created.
pub fn read_version(conn: &Connection) -> Result<Option<u32>, StorageError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok((version > 0).then_some(version))
}

pub fn write_version(conn: &Connection, version: u32) -> Result<(), StorageError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

pub fn create_meta_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {MASTER_TABLE} (
             id INTEGER PRIMARY KEY,
             identity_hash TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
             from_version INTEGER NOT NULL,
             to_version INTEGER NOT NULL,
             checksum TEXT NOT NULL,
             applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
             PRIMARY KEY (from_version, to_version)
         );"
    ))?;
    Ok(())
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StorageError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn read_identity(conn: &Connection) -> Result<Option<String>, StorageError> {
    if !table_exists(conn, MASTER_TABLE)? {
        return Ok(None);
    }
    let hash = conn
        .query_row(
            &format!("SELECT identity_hash FROM {MASTER_TABLE} WHERE id = ?1"),
            params![IDENTITY_ROW],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

pub fn write_identity(conn: &Connection, hash: &str) -> Result<(), StorageError> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO {MASTER_TABLE} (id, identity_hash) VALUES (?1, ?2)"),
        params![IDENTITY_ROW, hash],
    )?;
    Ok(())
}

pub fn applied_steps(conn: &Connection) -> Result<Vec<AppliedStep>, StorageError> {
    if !table_exists(conn, MIGRATIONS_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT from_version, to_version, checksum FROM {MIGRATIONS_TABLE} ORDER BY from_version, to_version"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(AppliedStep {
            from: row.get(0)?,
            to: row.get(1)?,
            checksum: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn record_step(conn: &Connection, step: &MigrationStep) -> Result<(), StorageError> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {MIGRATIONS_TABLE} (from_version, to_version, checksum) VALUES (?1, ?2, ?3)"
        ),
        params![step.from, step.to, step_checksum(step)],
    )?;
    Ok(())
}

pub fn clear_steps(conn: &Connection) -> Result<(), StorageError> {
    if table_exists(conn, MIGRATIONS_TABLE)? {
        conn.execute(&format!("DELETE FROM {MIGRATIONS_TABLE}"), [])?;
    }
    Ok(())
}

/// Fails if any declared step differs from the checksum recorded when it
/// was applied. Recorded steps that are no longer declared are ignored.
pub fn verify_history(conn: &Connection, declared: &[MigrationStep]) -> Result<(), StorageError> {
    for applied in applied_steps(conn)? {
        let Some(step) = declared
            .iter()
            .find(|s| s.from == applied.from && s.to == applied.to)
        else {
            tracing::debug!(from = applied.from, to = applied.to, "applied step is no longer declared");
            continue;
        };
        if step_checksum(step) != applied.checksum {
            return Err(StorageError::MigrationTampered {
                from: applied.from,
                to: applied.to,
            });
        }
    }
    Ok(())
}
