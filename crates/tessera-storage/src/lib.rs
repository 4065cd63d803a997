//! Embedded-store layer for tessera databases (SQLite via `rusqlite`).
//!
//! Owns everything that touches the database file outside of generated
//! operations: connection setup, whole-schema DDL, the persisted metadata
//! records and the migration reconciler that runs once at open time.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`connection`]: writer, reader and in-memory connections with shared pragmas
//! - [`values`]: storage value bridging and positional statement execution
//! - [`hash`]: blake3 schema identity and migration step checksums
//! - [`meta`]: version, identity and applied-step records
//! - [`ddl`]: schema creation and destructive drop
//! - [`introspect`]: persisted table structure and drift reports
//! - [`migrate`]: migration path selection
//! - [`reconcile`]: the open-time reconciler state machine

pub mod connection;
pub mod ddl;
pub mod error;
pub mod hash;
pub mod introspect;
pub mod meta;
pub mod migrate;
pub mod reconcile;
pub mod values;

// Re-export key types for ergonomic use.
pub use connection::{open_database, open_in_memory, open_reader};
pub use error::StorageError;
pub use hash::{schema_identity, step_checksum};
pub use introspect::verify_schema;
pub use migrate::plan_path;
pub use reconcile::{reconcile, ReconcileOptions, ReconcileOutcome, ReconcileState, Reconciler, SchemaValidation};
