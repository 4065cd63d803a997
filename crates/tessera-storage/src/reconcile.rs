//! Migration reconciler: aligns a persisted database with the declared
//! schema model once, at open time.
//!
//! ```text
//! Unopened -> VersionChecked -> UpToDate
//!                            -> MigrationPending -> UpToDate | MigrationFailed
//!                            -> SchemaMismatch
//! ```
//!
//! Every failure state is terminal for the process; the caller must not use
//! the database until the condition has been resolved outside of it.

use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tessera_core::migration::MigrationStep;
use tessera_core::schema::SchemaModel;

use crate::ddl::{create_schema, drop_schema};
use crate::error::StorageError;
use crate::hash::schema_identity;
use crate::introspect::verify_schema;
use crate::meta;
use crate::migrate::plan_path;

/// How an existing database at the declared version is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaValidation {
    /// Trust the version number.
    Off,
    /// Compare the persisted schema identity hash.
    #[default]
    Identity,
    /// Identity plus a table-by-table comparison of the persisted structure.
    Structural,
}

impl FromStr for SchemaValidation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(SchemaValidation::Off),
            "identity" => Ok(SchemaValidation::Identity),
            "structural" => Ok(SchemaValidation::Structural),
            other => Err(format!(
                "unknown schema validation mode '{}' (expected off, identity or structural)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub validation: SchemaValidation,
    /// Recreate the schema, discarding data, when no migration path exists or
    /// the persisted version is newer than the declared one.
    pub destructive_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Unopened,
    VersionChecked,
    UpToDate,
    MigrationPending,
    MigrationFailed,
    SchemaMismatch,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileState::Unopened => "unopened",
            ReconcileState::VersionChecked => "version_checked",
            ReconcileState::UpToDate => "up_to_date",
            ReconcileState::MigrationPending => "migration_pending",
            ReconcileState::MigrationFailed => "migration_failed",
            ReconcileState::SchemaMismatch => "schema_mismatch",
        };
        f.write_str(name)
    }
}

/// What a successful reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No schema existed; it was created at the declared version.
    Created,
    /// Already at the declared version; nothing was changed.
    Unchanged,
    Migrated { from: u32, steps: usize },
    /// The schema was dropped and recreated under `destructive_fallback`.
    Recreated { from: u32 },
}

pub struct Reconciler<'a> {
    schema: &'a SchemaModel,
    steps: &'a [MigrationStep],
    options: ReconcileOptions,
    state: ReconcileState,
}

impl<'a> Reconciler<'a> {
    pub fn new(schema: &'a SchemaModel, steps: &'a [MigrationStep], options: ReconcileOptions) -> Self {
        Reconciler {
            schema,
            steps,
            options,
            state: ReconcileState::Unopened,
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    fn transition(&mut self, next: ReconcileState) {
        tracing::info!(from = %self.state, to = %next, "reconciler state");
        self.state = next;
    }

    fn fail(&mut self, state: ReconcileState, err: StorageError) -> StorageError {
        self.transition(state);
        tracing::warn!(error = %err, "reconciliation failed");
        err
    }

    /// Runs the state machine against `conn`. Every change happens inside a
    /// single transaction; on error nothing persisted has changed.
    pub fn run(&mut self, conn: &mut Connection) -> Result<ReconcileOutcome, StorageError> {
        let declared = self.schema.version();
        let persisted = meta::read_version(conn)?;
        tracing::info!(declared, persisted = ?persisted, "checking schema version");
        self.transition(ReconcileState::VersionChecked);

        let Some(persisted) = persisted else {
            self.recreate(conn, false)?;
            self.transition(ReconcileState::UpToDate);
            return Ok(ReconcileOutcome::Created);
        };

        if persisted > declared {
            if self.options.destructive_fallback {
                tracing::warn!(persisted, declared, "downgrade; recreating schema");
                self.recreate(conn, true)?;
                self.transition(ReconcileState::UpToDate);
                return Ok(ReconcileOutcome::Recreated { from: persisted });
            }
            return Err(self.fail(
                ReconcileState::SchemaMismatch,
                StorageError::Downgrade { persisted, declared },
            ));
        }

        if let Err(err) = meta::verify_history(conn, self.steps) {
            return Err(self.fail(ReconcileState::SchemaMismatch, err));
        }

        if persisted == declared {
            let differences = self.check_existing(conn)?;
            if !differences.is_empty() {
                return Err(self.fail(
                    ReconcileState::SchemaMismatch,
                    StorageError::SchemaMismatch { differences },
                ));
            }
            self.transition(ReconcileState::UpToDate);
            return Ok(ReconcileOutcome::Unchanged);
        }

        self.transition(ReconcileState::MigrationPending);
        let path = match plan_path(self.steps, persisted, declared) {
            Ok(path) => path,
            Err(err) if self.options.destructive_fallback => {
                tracing::warn!(error = %err, "no migration path; recreating schema");
                self.recreate(conn, true)?;
                self.transition(ReconcileState::UpToDate);
                return Ok(ReconcileOutcome::Recreated { from: persisted });
            }
            Err(err) => return Err(self.fail(ReconcileState::MigrationFailed, err)),
        };

        match self.migrate(conn, &path) {
            Ok(()) => {
                self.transition(ReconcileState::UpToDate);
                Ok(ReconcileOutcome::Migrated {
                    from: persisted,
                    steps: path.len(),
                })
            }
            Err(err) => {
                let err = StorageError::MigrationFailed {
                    from: persisted,
                    to: declared,
                    reason: err.to_string(),
                };
                Err(self.fail(ReconcileState::MigrationFailed, err))
            }
        }
    }

    /// Differences between the persisted and declared schema at equal
    /// versions, per the configured validation mode.
    fn check_existing(&self, conn: &Connection) -> Result<Vec<String>, StorageError> {
        let mut differences = Vec::new();
        if self.options.validation == SchemaValidation::Off {
            return Ok(differences);
        }
        let expected = schema_identity(self.schema)?;
        match meta::read_identity(conn)? {
            Some(found) if found == expected => {}
            Some(_) => differences.push("schema identity hash differs from the declared schema".to_string()),
            None => differences.push("no schema identity is recorded".to_string()),
        }
        if self.options.validation == SchemaValidation::Structural {
            differences.extend(verify_schema(conn, self.schema)?);
        }
        Ok(differences)
    }

    fn migrate(&self, conn: &mut Connection, path: &[&MigrationStep]) -> Result<(), StorageError> {
        let identity = schema_identity(self.schema)?;
        let tx = conn.transaction()?;
        meta::create_meta_tables(&tx)?;
        for step in path {
            tracing::info!(from = step.from, to = step.to, statements = step.statements.len(), "applying migration step");
            for stmt in &step.statements {
                tx.execute_batch(stmt)?;
            }
            meta::record_step(&tx, step)?;
        }
        if self.options.validation != SchemaValidation::Off {
            let differences = verify_schema(&tx, self.schema)?;
            if !differences.is_empty() {
                return Err(StorageError::SchemaMismatch { differences });
            }
        }
        meta::write_identity(&tx, &identity)?;
        meta::write_version(&tx, self.schema.version())?;
        tx.commit()?;
        Ok(())
    }

    /// Full creation; with `drop_first`, declared tables and the step
    /// history are discarded beforehand.
    fn recreate(&self, conn: &mut Connection, drop_first: bool) -> Result<(), StorageError> {
        let identity = schema_identity(self.schema)?;
        let tx = conn.transaction()?;
        if drop_first {
            drop_schema(&tx, self.schema)?;
            meta::clear_steps(&tx)?;
        }
        meta::create_meta_tables(&tx)?;
        create_schema(&tx, self.schema)?;
        meta::write_identity(&tx, &identity)?;
        meta::write_version(&tx, self.schema.version())?;
        tx.commit()?;
        tracing::info!(version = self.schema.version(), tables = self.schema.len(), "schema created");
        Ok(())
    }
}

/// Runs a fresh [`Reconciler`] to completion.
pub fn reconcile(
    conn: &mut Connection,
    schema: &SchemaModel,
    steps: &[MigrationStep],
    options: ReconcileOptions,
) -> Result<ReconcileOutcome, StorageError> {
    let span = tracing::info_span!("reconcile", version = schema.version());
    let _enter = span.enter();
    Reconciler::new(schema, steps, options).run(conn)
}
