//! Access-object generation for tessera databases.
//!
//! This crate turns a validated descriptor tree into executable operation
//! plans and, optionally, typed Rust wrappers over them.
//!
//! # Modules
//!
//! - [`pipeline`] -- the all-or-nothing [`generate`] entry point
//! - [`structured`] -- insert/update/delete statements derived from tables
//! - [`bind`] -- call arguments to storage values
//! - [`materialize`] -- storage rows to records and scalars
//! - [`plan`] -- the generated surface the runtime executes
//! - [`emit`] -- Rust source emission via `quote` and `prettyplease`
//! - [`error`] -- error types for generation and binding

pub mod bind;
pub mod emit;
pub mod error;
pub mod materialize;
pub mod pipeline;
pub mod plan;
pub mod structured;

pub use bind::{Arg, BoundStatement, QueryBinder};
pub use emit::{emit_rust, emit_tokens};
pub use error::{BindError, CodegenError};
pub use materialize::{EntityReader, FieldReader, LocatedReader, ResultPlan};
pub use pipeline::generate;
pub use plan::{GeneratedContract, GeneratedDatabase, GeneratedOperation, OperationStatement};
pub use structured::{BoundColumn, StructuredStatement, WriteKind};
