//! Async runtime for generated tessera databases.
//!
//! [`Database::open`] generates the access surface for a descriptor, opens
//! the store and reconciles its schema. Access objects from
//! [`Database::dao`] execute operations by name; every call suspends the
//! calling task while the engine works on tokio's blocking pool.
//!
//! Writes are serialized through one writer connection and each runs in its
//! own transaction. Reads on file databases use a pool of read-only
//! connections. Calls accept a [`CancellationToken`]; a cancelled call
//! leaves nothing behind.

pub mod cancel;
pub mod config;
pub mod database;
pub mod error;
mod exec;
mod pool;
pub mod result;
pub mod stream;
pub mod transaction;

pub use cancel::CancellationToken;
pub use config::DatabaseConfig;
pub use database::{Dao, Database, Invalidation};
pub use error::RuntimeError;
pub use result::CallResult;
pub use stream::RowStream;
pub use transaction::Transaction;

pub use tessera_codegen::Arg;
pub use tessera_core::record::Record;
pub use tessera_core::value::DomainValue;
pub use tessera_storage::{ReconcileOutcome, SchemaValidation};
