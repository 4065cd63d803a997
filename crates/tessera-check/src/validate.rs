//! Whole-database query validation.

use std::collections::BTreeMap;

use tessera_core::contract::{AccessObjectContract, OperationKind};
use tessera_core::schema::SchemaModel;

use crate::compiled::CompiledQuery;
use crate::compiler::QueryCompiler;
use crate::diagnostics::QueryError;

/// Compiled queries keyed by `(contract, operation)`.
pub type CompiledQueries = BTreeMap<(String, String), CompiledQuery>;

/// Compiles every raw-query operation of every contract.
///
/// Unlike a single [`QueryCompiler::compile`] call this does not stop at the
/// first failure: all errors are collected and returned together, in contract
/// and operation declaration order.
pub fn validate_contracts(
    schema: &SchemaModel,
    contracts: &[AccessObjectContract],
) -> Result<CompiledQueries, Vec<QueryError>> {
    let compiler = QueryCompiler::new(schema);
    let mut compiled = CompiledQueries::new();
    let mut errors = Vec::new();

    for contract in contracts {
        for op in &contract.operations {
            if !matches!(op.kind, OperationKind::RawQuery { .. }) {
                continue;
            }
            match compiler.compile(&contract.name, op) {
                Ok(query) => {
                    compiled.insert((contract.name.clone(), op.name.clone()), query);
                }
                Err(err) => errors.push(err),
            }
        }
    }

    if errors.is_empty() {
        tracing::debug!(queries = compiled.len(), "validated contract queries");
        Ok(compiled)
    } else {
        Err(errors)
    }
}
