//! Build-time validation of raw queries against a schema model.
//!
//! Query text is tokenized with `sqlparser`, parsed into a coarse statement
//! structure, resolved against the [`SchemaModel`](tessera_core::SchemaModel)
//! and checked against the declared parameter list and return shape. The
//! result of a successful compilation is an immutable [`CompiledQuery`].

pub mod compiled;
pub mod compiler;
pub mod diagnostics;
pub mod parse;
pub mod resolve;
pub mod tokens;
pub mod validate;

pub use compiled::{BindSlot, BoundSql, CompiledQuery, FieldMapping, ParamBinding, ResultMapping, StatementKind};
pub use compiler::QueryCompiler;
pub use diagnostics::{QueryError, QueryErrorKind};
pub use validate::{validate_contracts, CompiledQueries};
