//! Top-level generation pipeline:
//! converters -> schema model -> query validation -> operation plans.
//!
//! [`generate`] is all-or-nothing. Schema and converter errors stop it at
//! once; query errors are collected across every contract first so a single
//! run reports all of them.

use std::collections::HashSet;

use indexmap::IndexMap;
use tessera_check::{validate_contracts, CompiledQueries, ResultMapping};
use tessera_core::contract::{AccessObjectContract, OperationDescriptor, OperationKind, ReturnShape};
use tessera_core::convert::{ConverterRegistry, ConverterScope};
use tessera_core::database::DatabaseDescriptor;
use tessera_core::schema::SchemaModel;

use crate::bind::QueryBinder;
use crate::error::CodegenError;
use crate::materialize::{EntityReader, FieldReader, ResultPlan};
use crate::plan::{GeneratedContract, GeneratedDatabase, GeneratedOperation, OperationStatement};
use crate::structured::StructuredStatement;

/// Generates the access-object surface for `desc`.
///
/// `registry` holds host-registered converters; the descriptor's own
/// converter declarations are added to a copy of it.
pub fn generate(desc: &DatabaseDescriptor, registry: &ConverterRegistry) -> Result<GeneratedDatabase, CodegenError> {
    let span = tracing::info_span!("generate", database = %desc.name, version = desc.version);
    let _enter = span.enter();

    let mut registry = registry.clone();
    registry.register_declarations(&desc.converters)?;

    let schema = SchemaModel::build(&desc.entities, desc.version, &registry)?;
    check_names(&desc.contracts)?;
    let mut compiled = validate_contracts(&schema, &desc.contracts).map_err(|errors| {
        tracing::debug!(errors = errors.len(), "query validation failed");
        CodegenError::QueryValidationFailed(errors)
    })?;

    let mut contracts = IndexMap::new();
    for contract in &desc.contracts {
        let mut operations = IndexMap::new();
        for op in &contract.operations {
            let generated = generate_operation(&schema, &registry, &contract.name, op, &mut compiled)?;
            operations.insert(op.name.clone(), generated);
        }
        tracing::debug!(contract = %contract.name, operations = operations.len(), "generated contract");
        contracts.insert(
            contract.name.clone(),
            GeneratedContract {
                name: contract.name.clone(),
                operations,
            },
        );
    }

    tracing::info!(
        tables = schema.len(),
        contracts = contracts.len(),
        "generated database surface"
    );
    Ok(GeneratedDatabase {
        name: desc.name.clone(),
        schema,
        registry,
        contracts,
        migrations: desc.migrations.clone(),
    })
}

fn check_names(contracts: &[AccessObjectContract]) -> Result<(), CodegenError> {
    let mut seen = HashSet::new();
    for contract in contracts {
        if !seen.insert(contract.name.as_str()) {
            return Err(CodegenError::Duplicate {
                kind: "contract",
                name: contract.name.clone(),
            });
        }
        let mut ops = HashSet::new();
        for op in &contract.operations {
            if !ops.insert(op.name.as_str()) {
                return Err(CodegenError::Duplicate {
                    kind: "operation",
                    name: format!("{}.{}", contract.name, op.name),
                });
            }
        }
    }
    Ok(())
}

fn generate_operation(
    schema: &SchemaModel,
    registry: &ConverterRegistry,
    contract: &str,
    op: &OperationDescriptor,
    compiled: &mut CompiledQueries,
) -> Result<GeneratedOperation, CodegenError> {
    let contract_scope = [ConverterScope::Contract(contract.to_string())];
    let (statement, result) = match &op.kind {
        OperationKind::RawQuery { .. } => {
            let query = compiled
                .remove(&(contract.to_string(), op.name.clone()))
                .ok_or_else(|| CodegenError::invalid(contract, &op.name, "query was not compiled"))?;
            let converters = query
                .parameters
                .iter()
                .map(|p| registry.converter_for(&p.domain_type, &contract_scope))
                .collect::<Result<Vec<_>, _>>()?;
            let result = query_result(schema, registry, contract, &op.name, &query.mapping)?;
            (OperationStatement::Query(QueryBinder { query, converters }), result)
        }
        _ => {
            let stmt = StructuredStatement::derive(schema, registry, contract, op)?;
            let result = match op.returns {
                ReturnShape::InsertedKey => ResultPlan::InsertedKey,
                ReturnShape::InsertedKeys => ResultPlan::InsertedKeys,
                ReturnShape::RowCount => ResultPlan::RowCount,
                _ => ResultPlan::Unit,
            };
            (OperationStatement::Write(stmt), result)
        }
    };
    tracing::debug!(contract, operation = %op.name, "generated operation");
    Ok(GeneratedOperation {
        contract: contract.to_string(),
        name: op.name.clone(),
        params: op.params.clone(),
        returns: op.returns.clone(),
        statement,
        result,
    })
}

fn query_result(
    schema: &SchemaModel,
    registry: &ConverterRegistry,
    contract: &str,
    operation: &str,
    mapping: &ResultMapping,
) -> Result<ResultPlan, CodegenError> {
    Ok(match mapping {
        ResultMapping::None => ResultPlan::Unit,
        ResultMapping::RowCount => ResultPlan::RowCount,
        ResultMapping::InsertedKey => ResultPlan::InsertedKey,
        ResultMapping::Rows => ResultPlan::Rows,
        ResultMapping::Scalar { domain_type, many } => ResultPlan::Scalar {
            converter: registry.converter_for(domain_type, &[ConverterScope::Contract(contract.to_string())])?,
            many: *many,
        },
        ResultMapping::Entity { entity, fields, many } => {
            let scopes = [
                ConverterScope::Contract(contract.to_string()),
                ConverterScope::Entity(entity.clone()),
            ];
            let table = schema
                .table(entity)
                .ok_or_else(|| CodegenError::invalid(contract, operation, format!("unknown entity '{}'", entity)))?;
            let fields = fields
                .iter()
                .filter_map(|m| table.column_for_field(&m.field).map(|col| (m, col)))
                .map(|(m, col)| {
                    Ok(FieldReader {
                        field: m.field.clone(),
                        column: m.column.clone(),
                        nullable: col.nullable,
                        converter: registry.converter_for(&col.domain_type, &scopes)?,
                    })
                })
                .collect::<Result<Vec<_>, CodegenError>>()?;
            ResultPlan::Entity {
                reader: EntityReader {
                    entity: entity.clone(),
                    fields,
                },
                many: *many,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::contract::ParamDescriptor;
    use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor};
    use tessera_core::types::{DomainType, StorageType};
    use tessera_core::ConverterDeclaration;

    fn descriptor() -> DatabaseDescriptor {
        let item = EntityDescriptor::new("Item")
            .table("items")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("name", DomainType::String))
            .field(FieldDescriptor::new("price", DomainType::F64))
            .auto_key("id");
        let dao = AccessObjectContract::new("ItemDao")
            .operation(
                OperationDescriptor::query("by_id", "SELECT * FROM items WHERE id = :id", ReturnShape::Entity("Item".into()))
                    .param(ParamDescriptor::value("id", DomainType::I64)),
            )
            .operation(
                OperationDescriptor::insert("add", "Item", ReturnShape::InsertedKey)
                    .param(ParamDescriptor::entity("item", "Item")),
            )
            .operation(
                OperationDescriptor::insert("add_all", "Item", ReturnShape::Void)
                    .param(ParamDescriptor::entity("items", "Item").collection()),
            );
        DatabaseDescriptor::new("Shop", 1).entity(item).contract(dao)
    }

    #[test]
    fn generates_every_operation() {
        let db = generate(&descriptor(), &ConverterRegistry::new()).unwrap();
        assert_eq!(db.version(), 1);
        let contract = db.contract("ItemDao").unwrap();
        let names: Vec<&str> = contract.operations.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["by_id", "add", "add_all"]);

        let by_id = db.operation("ItemDao", "by_id").unwrap();
        assert!(!by_id.is_write());
        assert!(matches!(by_id.result, ResultPlan::Entity { many: false, .. }));

        let add_all = db.operation("ItemDao", "add_all").unwrap();
        assert!(add_all.is_write());
        assert!(add_all.is_batch());
        assert_eq!(add_all.written_tables().into_iter().collect::<Vec<_>>(), vec!["items"]);
    }

    #[test]
    fn query_errors_abort_generation() {
        let mut desc = descriptor();
        desc.contracts[0].operations.push(OperationDescriptor::query(
            "broken",
            "SELECT colour FROM items",
            ReturnShape::Rows,
        ));
        desc.contracts[0].operations.push(
            OperationDescriptor::query("broken_too", "SELECT * FROM items WHERE price > ?", ReturnShape::Rows)
                .param(ParamDescriptor::value("a", DomainType::F64))
                .param(ParamDescriptor::value("b", DomainType::F64)),
        );
        match generate(&desc, &ConverterRegistry::new()) {
            Err(CodegenError::QueryValidationFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected query validation failure, got {:?}", other.map(|d| d.name)),
        }
    }

    #[test]
    fn duplicate_operation_names_are_rejected() {
        let mut desc = descriptor();
        let dup = desc.contracts[0].operations[0].clone();
        desc.contracts[0].operations.push(dup);
        assert!(matches!(
            generate(&desc, &ConverterRegistry::new()),
            Err(CodegenError::Duplicate { kind: "operation", .. })
        ));
    }

    #[test]
    fn custom_types_need_a_converter() {
        let mut desc = descriptor();
        desc.entities[0]
            .fields
            .push(FieldDescriptor::new("added", DomainType::Custom("Timestamp".into())));
        assert!(matches!(
            generate(&desc, &ConverterRegistry::new()),
            Err(CodegenError::Schema(_))
        ));

        desc.converters.push(ConverterDeclaration {
            domain_type: DomainType::Custom("Timestamp".into()),
            storage_type: StorageType::Text,
        });
        let db = generate(&desc, &ConverterRegistry::new()).unwrap();
        let column = db.schema.table("Item").unwrap().column("added").unwrap();
        assert_eq!(column.storage_type, StorageType::Text);
    }
}
