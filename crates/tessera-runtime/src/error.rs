//! Runtime error types.
//!
//! [`RuntimeError`] is what every database handle, access object and
//! transaction method returns. Storage engine failures during a call surface
//! as [`RuntimeError::TransactionFailure`] after the enclosing transaction
//! (or savepoint) has already been rolled back. Only lock contention and
//! cancellation are worth retrying; see [`RuntimeError::is_retryable`].

use rusqlite::ErrorCode;
use tessera_codegen::{BindError, CodegenError};
use tessera_core::error::ConversionError;
use tessera_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Generation failed; the database was not opened.
    #[error("generation failed: {0}")]
    Codegen(#[from] CodegenError),

    /// Open-time reconciliation or storage setup failed. Fatal.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Call arguments did not match the operation.
    #[error("invalid arguments: {0}")]
    Bind(#[from] BindError),

    /// A stored value could not be converted back to its domain type.
    #[error("result conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    /// The engine rejected the call. Any writes it made were rolled back.
    #[error("database call failed: {0}")]
    TransactionFailure(rusqlite::Error),

    /// The call was cancelled; nothing it did is visible.
    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown access object '{0}'")]
    UnknownContract(String),

    #[error("unknown operation '{contract}.{operation}'")]
    UnknownOperation { contract: String, operation: String },

    /// A result was unwrapped as a different shape than the operation returns.
    #[error("operation returned {found}, not {expected}")]
    ResultShape {
        expected: &'static str,
        found: &'static str,
    },

    /// The transaction was already committed, rolled back or abandoned.
    #[error("transaction is no longer active")]
    TransactionFinished,

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for RuntimeError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => RuntimeError::Cancelled,
            _ => RuntimeError::TransactionFailure(err),
        }
    }
}

impl From<StorageError> for RuntimeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Sqlite(e) => RuntimeError::from(e),
            other => RuntimeError::Storage(other),
        }
    }
}

impl From<tokio::task::JoinError> for RuntimeError {
    fn from(err: tokio::task::JoinError) -> Self {
        RuntimeError::Worker(err.to_string())
    }
}

impl RuntimeError {
    /// Whether retrying the same call can succeed.
    ///
    /// Constraint violations, I/O faults and the like fail again on the same
    /// input; a busy or locked database and a cancelled call may not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RuntimeError::Cancelled => true,
            RuntimeError::TransactionFailure(err) => matches!(
                err.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    fn engine(code: i32) -> RuntimeError {
        RuntimeError::from(rusqlite::Error::SqliteFailure(ffi::Error::new(code), None))
    }

    #[test]
    fn interrupt_becomes_cancelled() {
        let err = engine(ffi::SQLITE_INTERRUPT);
        assert!(matches!(err, RuntimeError::Cancelled));
        assert!(err.is_retryable());
    }

    #[test]
    fn only_contention_is_retryable() {
        assert!(engine(ffi::SQLITE_BUSY).is_retryable());
        assert!(engine(ffi::SQLITE_LOCKED).is_retryable());
        assert!(!engine(ffi::SQLITE_CONSTRAINT_UNIQUE).is_retryable());
        assert!(!engine(ffi::SQLITE_READONLY).is_retryable());
        assert!(!RuntimeError::from(rusqlite::Error::QueryReturnedNoRows).is_retryable());
        assert!(!RuntimeError::TransactionFinished.is_retryable());
    }
}
