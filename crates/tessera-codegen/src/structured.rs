//! Structured insert/update/delete statements derived from table definitions.
//!
//! Column order always follows the entity's field order. Auto-generated key
//! columns are left out of inserts; the store assigns them and the runtime
//! reports the generated key instead.

use tessera_core::contract::{ConflictStrategy, OperationDescriptor, OperationKind, ParamType, ReturnShape};
use tessera_core::convert::{Converter, ConverterRegistry, ConverterScope};
use tessera_core::ident::{quote_ident, quote_list};
use tessera_core::schema::{ColumnDefinition, SchemaModel, TableDefinition};

use crate::error::CodegenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// A column value taken from an entity argument.
#[derive(Debug, Clone)]
pub struct BoundColumn {
    pub field: String,
    pub column: String,
    pub nullable: bool,
    pub converter: Converter,
}

/// A generated single-table write, executed once per entity argument.
#[derive(Debug, Clone)]
pub struct StructuredStatement {
    pub kind: WriteKind,
    pub entity: String,
    pub table: String,
    pub sql: String,
    /// Bound in this order, one `?` each.
    pub columns: Vec<BoundColumn>,
    /// The argument is a collection of entities, written in one transaction.
    pub batch: bool,
}

impl StructuredStatement {
    /// Derives the statement for a structured operation of `contract`.
    pub fn derive(
        schema: &SchemaModel,
        registry: &ConverterRegistry,
        contract: &str,
        op: &OperationDescriptor,
    ) -> Result<StructuredStatement, CodegenError> {
        let (kind, entity, conflict) = match &op.kind {
            OperationKind::Insert { entity, on_conflict } => (WriteKind::Insert, entity, *on_conflict),
            OperationKind::Update { entity, on_conflict } => (WriteKind::Update, entity, *on_conflict),
            OperationKind::Delete { entity } => (WriteKind::Delete, entity, ConflictStrategy::Abort),
            OperationKind::RawQuery { .. } => {
                return Err(CodegenError::invalid(contract, &op.name, "raw query is not a structured write"))
            }
        };
        let table = schema
            .table(entity)
            .ok_or_else(|| CodegenError::invalid(contract, &op.name, format!("unknown entity '{}'", entity)))?;

        let batch = entity_parameter(contract, op, entity)?;
        check_return(contract, op, kind, batch)?;

        let scopes = [ConverterScope::Contract(contract.to_string()), ConverterScope::Entity(entity.clone())];
        let bind = |col: &ColumnDefinition| -> Result<BoundColumn, CodegenError> {
            Ok(BoundColumn {
                field: col.field.clone(),
                column: col.name.clone(),
                nullable: col.nullable,
                converter: registry.converter_for(&col.domain_type, &scopes)?,
            })
        };

        let key: Vec<&ColumnDefinition> = table
            .primary_key
            .columns
            .iter()
            .filter_map(|c| table.column(c))
            .collect();
        if kind != WriteKind::Insert && key.is_empty() {
            return Err(CodegenError::invalid(contract, &op.name, "updates and deletes need a primary key"));
        }

        let (sql, columns) = match kind {
            WriteKind::Insert => {
                let auto = table.auto_key_column().map(|c| c.name.as_str());
                let cols: Vec<&ColumnDefinition> = table
                    .columns
                    .iter()
                    .filter(|c| Some(c.name.as_str()) != auto)
                    .collect();
                (insert_sql(table, &cols, conflict), cols)
            }
            WriteKind::Update => {
                let set: Vec<&ColumnDefinition> = table
                    .columns
                    .iter()
                    .filter(|c| !table.is_primary_key(&c.name))
                    .collect();
                if set.is_empty() {
                    return Err(CodegenError::invalid(
                        contract,
                        &op.name,
                        format!("entity '{}' has no non-key columns to update", entity),
                    ));
                }
                let sql = update_sql(table, &set, &key, conflict);
                (sql, set.into_iter().chain(key.iter().copied()).collect())
            }
            WriteKind::Delete => (delete_sql(table, &key), key.clone()),
        };

        Ok(StructuredStatement {
            kind,
            entity: entity.clone(),
            table: table.name.clone(),
            sql,
            columns: columns.into_iter().map(bind).collect::<Result<_, _>>()?,
            batch,
        })
    }
}

/// Exactly one parameter, of the operation's entity type. Returns whether it
/// is a collection.
fn entity_parameter(contract: &str, op: &OperationDescriptor, entity: &str) -> Result<bool, CodegenError> {
    match op.params.as_slice() {
        [param] => match &param.ty {
            ParamType::Entity(e) if e == entity => Ok(param.collection),
            _ => Err(CodegenError::invalid(
                contract,
                &op.name,
                format!("parameter '{}' must be a '{}' entity", param.name, entity),
            )),
        },
        params => Err(CodegenError::invalid(
            contract,
            &op.name,
            format!("structured writes take exactly one parameter, found {}", params.len()),
        )),
    }
}

fn check_return(contract: &str, op: &OperationDescriptor, kind: WriteKind, batch: bool) -> Result<(), CodegenError> {
    let ok = match (kind, &op.returns) {
        (_, ReturnShape::Void) => true,
        (WriteKind::Insert, ReturnShape::InsertedKey) => !batch,
        (WriteKind::Insert, ReturnShape::InsertedKeys) => batch,
        (WriteKind::Update | WriteKind::Delete, ReturnShape::RowCount) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(CodegenError::invalid(
            contract,
            &op.name,
            format!("return shape {:?} does not fit a {} write", op.returns, if batch { "batch" } else { "single" }),
        ))
    }
}

fn names<'a>(cols: &[&'a ColumnDefinition]) -> Vec<&'a str> {
    cols.iter().map(|c| c.name.as_str()).collect()
}

fn verb(base: &str, conflict: ConflictStrategy) -> String {
    match conflict {
        ConflictStrategy::Abort => base.to_string(),
        other => format!("{} OR {}", base, other.sql()),
    }
}

fn insert_sql(table: &TableDefinition, cols: &[&ColumnDefinition], conflict: ConflictStrategy) -> String {
    if cols.is_empty() {
        return format!("{} INTO {} DEFAULT VALUES", verb("INSERT", conflict), quote_ident(&table.name));
    }
    format!(
        "{} INTO {} ({}) VALUES ({})",
        verb("INSERT", conflict),
        quote_ident(&table.name),
        quote_list(&names(cols)),
        vec!["?"; cols.len()].join(", ")
    )
}

fn assignments(cols: &[&ColumnDefinition], sep: &str) -> String {
    cols.iter()
        .map(|c| format!("{} = ?", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(sep)
}

fn update_sql(
    table: &TableDefinition,
    set: &[&ColumnDefinition],
    key: &[&ColumnDefinition],
    conflict: ConflictStrategy,
) -> String {
    format!(
        "{} {} SET {} WHERE {}",
        verb("UPDATE", conflict),
        quote_ident(&table.name),
        assignments(set, ", "),
        assignments(key, " AND ")
    )
}

fn delete_sql(table: &TableDefinition, key: &[&ColumnDefinition]) -> String {
    format!("DELETE FROM {} WHERE {}", quote_ident(&table.name), assignments(key, " AND "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::contract::ParamDescriptor;
    use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor};
    use tessera_core::types::DomainType;

    fn schema() -> SchemaModel {
        let item = EntityDescriptor::new("Item")
            .table("items")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("name", DomainType::String))
            .field(FieldDescriptor::new("price", DomainType::F64).column("unit_price"))
            .auto_key("id");
        let tag = EntityDescriptor::new("Tag")
            .field(FieldDescriptor::new("item", DomainType::I64))
            .field(FieldDescriptor::new("label", DomainType::String))
            .key(["item", "label"]);
        SchemaModel::build(&[item, tag], 1, &ConverterRegistry::new()).unwrap()
    }

    fn derive(op: OperationDescriptor) -> Result<StructuredStatement, CodegenError> {
        StructuredStatement::derive(&schema(), &ConverterRegistry::new(), "ItemDao", &op)
    }

    #[test]
    fn insert_omits_auto_key() {
        let stmt = derive(
            OperationDescriptor::insert("add", "Item", ReturnShape::InsertedKey)
                .param(ParamDescriptor::entity("item", "Item")),
        )
        .unwrap();
        assert_eq!(stmt.sql, r#"INSERT INTO "items" ("name", "unit_price") VALUES (?, ?)"#);
        let fields: Vec<&str> = stmt.columns.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "price"]);
        assert!(!stmt.batch);
    }

    #[test]
    fn insert_with_conflict_strategy() {
        let stmt = derive(
            OperationDescriptor::insert("upsert", "Item", ReturnShape::Void)
                .on_conflict(ConflictStrategy::Replace)
                .param(ParamDescriptor::entity("item", "Item")),
        )
        .unwrap();
        assert!(stmt.sql.starts_with("INSERT OR REPLACE INTO"), "{}", stmt.sql);
    }

    #[test]
    fn update_binds_values_then_key() {
        let stmt = derive(
            OperationDescriptor::update("save", "Item", ReturnShape::RowCount)
                .param(ParamDescriptor::entity("item", "Item")),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            r#"UPDATE "items" SET "name" = ?, "unit_price" = ? WHERE "id" = ?"#
        );
        let cols: Vec<&str> = stmt.columns.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(cols, vec!["name", "unit_price", "id"]);
    }

    #[test]
    fn delete_by_composite_key() {
        let stmt = StructuredStatement::derive(
            &schema(),
            &ConverterRegistry::new(),
            "TagDao",
            &OperationDescriptor::delete("remove_all", "Tag", ReturnShape::Void)
                .param(ParamDescriptor::entity("tags", "Tag").collection()),
        )
        .unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "Tag" WHERE "item" = ? AND "label" = ?"#);
        assert!(stmt.batch);
    }

    #[test]
    fn update_of_key_only_entity_is_rejected() {
        let err = StructuredStatement::derive(
            &schema(),
            &ConverterRegistry::new(),
            "TagDao",
            &OperationDescriptor::update("save", "Tag", ReturnShape::Void)
                .param(ParamDescriptor::entity("tag", "Tag")),
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::InvalidOperation { .. }));
    }

    #[test]
    fn signature_must_match_entity() {
        let wrong_entity = derive(
            OperationDescriptor::insert("add", "Item", ReturnShape::Void)
                .param(ParamDescriptor::entity("tag", "Tag")),
        );
        assert!(matches!(wrong_entity, Err(CodegenError::InvalidOperation { .. })));

        let no_param = derive(OperationDescriptor::delete("remove", "Item", ReturnShape::Void));
        assert!(matches!(no_param, Err(CodegenError::InvalidOperation { .. })));
    }

    #[test]
    fn return_shape_must_fit() {
        let keys_for_single = derive(
            OperationDescriptor::insert("add", "Item", ReturnShape::InsertedKeys)
                .param(ParamDescriptor::entity("item", "Item")),
        );
        assert!(keys_for_single.is_err());

        let keys_for_batch = derive(
            OperationDescriptor::insert("add_all", "Item", ReturnShape::InsertedKeys)
                .param(ParamDescriptor::entity("items", "Item").collection()),
        );
        assert!(keys_for_batch.is_ok());

        let count_for_insert = derive(
            OperationDescriptor::insert("add", "Item", ReturnShape::RowCount)
                .param(ParamDescriptor::entity("item", "Item")),
        );
        assert!(count_for_insert.is_err());
    }
}
