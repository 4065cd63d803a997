//! The generated access-object surface.
//!
//! A [`GeneratedDatabase`] is the complete, validated output of the
//! pipeline: the schema model, the converter registry it was resolved
//! against, and one [`GeneratedOperation`] per declared contract method.
//! The runtime executes operations from this structure; [`crate::emit`]
//! renders typed Rust wrappers over it.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use tessera_core::contract::{ParamDescriptor, ReturnShape};
use tessera_core::convert::ConverterRegistry;
use tessera_core::migration::MigrationStep;
use tessera_core::schema::SchemaModel;

use crate::bind::QueryBinder;
use crate::materialize::ResultPlan;
use crate::structured::StructuredStatement;

#[derive(Debug, Clone)]
pub struct GeneratedDatabase {
    pub name: String,
    pub schema: SchemaModel,
    pub registry: ConverterRegistry,
    pub contracts: IndexMap<String, GeneratedContract>,
    pub migrations: Vec<MigrationStep>,
}

impl GeneratedDatabase {
    pub fn version(&self) -> u32 {
        self.schema.version()
    }

    pub fn contract(&self, name: &str) -> Option<&GeneratedContract> {
        self.contracts.get(name)
    }

    pub fn operation(&self, contract: &str, operation: &str) -> Option<&GeneratedOperation> {
        self.contract(contract)?.operations.get(operation)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedContract {
    pub name: String,
    pub operations: IndexMap<String, GeneratedOperation>,
}

/// One executable contract method.
#[derive(Debug, Clone)]
pub struct GeneratedOperation {
    pub contract: String,
    pub name: String,
    pub params: Vec<ParamDescriptor>,
    pub returns: ReturnShape,
    pub statement: OperationStatement,
    pub result: ResultPlan,
}

#[derive(Debug, Clone)]
pub enum OperationStatement {
    Query(QueryBinder),
    Write(StructuredStatement),
}

impl GeneratedOperation {
    /// Writes go through the serialized writer.
    pub fn is_write(&self) -> bool {
        match &self.statement {
            OperationStatement::Query(q) => q.query.kind.is_write(),
            OperationStatement::Write(_) => true,
        }
    }

    /// Batch writes run every item inside one transaction.
    pub fn is_batch(&self) -> bool {
        matches!(&self.statement, OperationStatement::Write(w) if w.batch)
    }

    /// Tables the operation modifies, reported to invalidation subscribers
    /// after commit.
    pub fn written_tables(&self) -> BTreeSet<String> {
        match &self.statement {
            OperationStatement::Query(q) => q.query.written_table.iter().cloned().collect(),
            OperationStatement::Write(w) => BTreeSet::from([w.table.clone()]),
        }
    }

    /// Every table the operation touches.
    pub fn tables(&self) -> BTreeSet<String> {
        match &self.statement {
            OperationStatement::Query(q) => q.query.tables.clone(),
            OperationStatement::Write(w) => BTreeSet::from([w.table.clone()]),
        }
    }
}
