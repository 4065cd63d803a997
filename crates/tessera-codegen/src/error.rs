//! Codegen error types covering every way generation and binding can fail.

use tessera_check::QueryError;
use tessera_core::{ConversionError, ConverterError, SchemaError};

/// Errors that abort generation. Nothing is generated when any occurs.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// The entity descriptors do not form a valid schema.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Converter declarations conflict or a type cannot be resolved.
    #[error("converter error: {0}")]
    Converter(#[from] ConverterError),

    /// One or more raw queries failed validation.
    #[error("query validation failed with {} error(s)", .0.len())]
    QueryValidationFailed(Vec<QueryError>),

    /// A contract declares the same name twice.
    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// A structured operation's signature does not fit its entity.
    #[error("{contract}.{operation}: {reason}")]
    InvalidOperation {
        contract: String,
        operation: String,
        reason: String,
    },

    /// The generated token stream did not form a valid Rust file.
    #[error("emitted source is not valid Rust: {0}")]
    Emit(String),
}

impl CodegenError {
    pub(crate) fn invalid(contract: &str, operation: &str, reason: impl Into<String>) -> Self {
        CodegenError::InvalidOperation {
            contract: contract.to_string(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Arguments of one call that cannot be bound to the operation's statement.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    #[error("expected {expected} argument(s), got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument '{param}' must be {expected}")]
    ArgumentKind { param: String, expected: &'static str },

    #[error("entity argument is missing non-nullable field '{field}'")]
    MissingField { field: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
