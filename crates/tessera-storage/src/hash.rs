//! Deterministic fingerprints using blake3.
//!
//! The schema identity is a hash of the canonical JSON encoding of the
//! schema model. The model keeps its tables in an `IndexMap` and every
//! nested collection is a `Vec`, so the encoding (and the hash) depends only
//! on declared content and order.

use tessera_core::migration::MigrationStep;
use tessera_core::schema::SchemaModel;

use crate::error::StorageError;

/// Identity hash of a schema model, as lowercase hex.
pub fn schema_identity(schema: &SchemaModel) -> Result<String, StorageError> {
    let bytes = serde_json::to_vec(schema)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Checksum of a published migration step, as lowercase hex.
pub fn step_checksum(step: &MigrationStep) -> String {
    blake3::hash(&step.checksum_input()).to_hex().to_string()
}
