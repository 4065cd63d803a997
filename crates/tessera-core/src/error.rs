//! Core error types for tessera-core.
//!
//! Uses `thiserror` for structured, matchable error variants:
//! - [`SchemaError`]: a malformed declared schema (build time, fatal).
//! - [`ConverterError`]: converter registration conflicts and unresolved
//!   domain types (build time, fatal).
//! - [`ConversionError`]: a single value failed to convert at call time.

use thiserror::Error;

use crate::types::{DomainType, StorageType};

/// Why a set of entity descriptors could not be turned into a schema model.
///
/// Every variant names the offending entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("entity '{entity}': declares no fields")]
    EmptyEntity { entity: String },

    #[error("entity '{entity}': table name '{table}' is already used by entity '{existing}'")]
    DuplicateTable {
        entity: String,
        table: String,
        existing: String,
    },

    #[error("entity '{entity}': duplicate column '{column}'")]
    DuplicateColumn { entity: String, column: String },

    #[error("entity '{entity}': {field_kind} references unknown field '{field}'")]
    UnknownField {
        entity: String,
        field_kind: String,
        field: String,
    },

    #[error("entity '{entity}': foreign key references unknown entity '{target}'")]
    UnknownForeignKeyTarget { entity: String, target: String },

    #[error("entity '{entity}': foreign key to '{target}' is invalid: {reason}")]
    InvalidForeignKey {
        entity: String,
        target: String,
        reason: String,
    },

    #[error("entity '{entity}': primary key collision: {reason}")]
    PrimaryKeyCollision { entity: String, reason: String },

    #[error("entity '{entity}': index '{index}' is declared twice")]
    DuplicateIndex { entity: String, index: String },

    #[error("entity '{entity}': field '{field}' type cannot be stored: {source}")]
    UnstorableField {
        entity: String,
        field: String,
        #[source]
        source: ConverterError,
    },

    #[error("schema version must be at least 1, got {version}")]
    InvalidVersion { version: u32 },
}

impl SchemaError {
    /// The entity the error is attributed to, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            SchemaError::EmptyEntity { entity }
            | SchemaError::DuplicateTable { entity, .. }
            | SchemaError::DuplicateColumn { entity, .. }
            | SchemaError::UnknownField { entity, .. }
            | SchemaError::UnknownForeignKeyTarget { entity, .. }
            | SchemaError::InvalidForeignKey { entity, .. }
            | SchemaError::PrimaryKeyCollision { entity, .. }
            | SchemaError::DuplicateIndex { entity, .. }
            | SchemaError::UnstorableField { entity, .. } => Some(entity),
            SchemaError::InvalidVersion { .. } => None,
        }
    }
}

/// Registration or resolution failure in the converter registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConverterError {
    /// A converter for the same domain type already exists in the scope and
    /// was registered from a different origin or targets a different storage
    /// type.
    #[error(
        "converter conflict for {domain} in scope {scope}: '{existing_origin}' maps to {existing_storage}, '{origin}' maps to {storage}"
    )]
    Conflict {
        domain: DomainType,
        scope: String,
        storage: StorageType,
        origin: String,
        existing_storage: StorageType,
        existing_origin: String,
    },

    /// The type is not natively supported and no converter is registered.
    #[error("unresolved type: no converter registered for {domain}")]
    Unresolved { domain: DomainType },
}

/// A single value could not be converted between domain and storage form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("expected a {expected} value, got {actual}")]
    ValueMismatch { expected: String, actual: String },

    #[error("value {value} does not fit in {target}")]
    OutOfRange { value: i64, target: String },

    #[error("null value for non-nullable {slot}")]
    UnexpectedNull { slot: String },

    #[error("converter for {domain} failed: {reason}")]
    Custom { domain: DomainType, reason: String },
}
