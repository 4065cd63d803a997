//! Schema model: the relational tables derived from entity descriptors.
//!
//! [`SchemaModel::build`] is the only constructor. It runs in two passes:
//!
//! 1. register every entity and table name, so foreign keys may point at
//!    entities declared later in the list;
//! 2. resolve columns (through the converter registry), primary keys,
//!    indices and foreign keys against the registered names.
//!
//! The model is immutable once built. Foreign keys hold the parent's name and
//! are resolved by lookup, never by reference.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::convert::{ConverterRegistry, ConverterScope};
use crate::descriptor::{EntityDescriptor, ForeignKeyAction};
use crate::error::SchemaError;
use crate::ident::{quote_ident, quote_list};
use crate::types::{DomainType, StorageType};

/// All tables of one database configuration at one schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaModel {
    version: u32,
    /// Keyed by entity name, in declaration order.
    tables: IndexMap<String, TableDefinition>,
}

/// One derived table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub entity: String,
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: PrimaryKeyDefinition,
    pub indices: Vec<IndexDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

/// A column, carrying both the declared domain type and the resolved
/// storage type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// The entity field this column stores.
    pub field: String,
    pub name: String,
    pub domain_type: DomainType,
    pub storage_type: StorageType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDefinition {
    /// Column names, in key order.
    pub columns: Vec<String>,
    pub auto_generate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    pub parent_entity: String,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    pub child_columns: Vec<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
    pub deferred: bool,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

impl SchemaModel {
    /// Derives the schema model for `entities` at `version`.
    ///
    /// Column storage types are resolved through `registry`, consulting the
    /// entity's own converter scope first.
    pub fn build(
        entities: &[EntityDescriptor],
        version: u32,
        registry: &ConverterRegistry,
    ) -> Result<SchemaModel, SchemaError> {
        if version < 1 {
            return Err(SchemaError::InvalidVersion { version });
        }

        // Pass 1: names.
        let mut by_entity: HashMap<&str, &EntityDescriptor> = HashMap::new();
        let mut table_owner: HashMap<String, &str> = HashMap::new();
        for entity in entities {
            let table = entity.effective_table_name();
            if let Some(existing) = by_entity.get(entity.name.as_str()) {
                return Err(SchemaError::DuplicateTable {
                    entity: entity.name.clone(),
                    table: table.to_string(),
                    existing: existing.name.clone(),
                });
            }
            if let Some(existing) = table_owner.get(&table.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateTable {
                    entity: entity.name.clone(),
                    table: table.to_string(),
                    existing: existing.to_string(),
                });
            }
            by_entity.insert(&entity.name, entity);
            table_owner.insert(table.to_ascii_lowercase(), &entity.name);
        }

        // Pass 2: tables.
        let mut tables = IndexMap::new();
        let mut index_names: HashSet<String> = HashSet::new();
        for entity in entities {
            let table = build_table(entity, &by_entity, registry, &mut index_names)?;
            tables.insert(entity.name.clone(), table);
        }

        Ok(SchemaModel { version, tables })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Tables in entity declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks up a table by entity name.
    pub fn table(&self, entity: &str) -> Option<&TableDefinition> {
        self.tables.get(entity)
    }

    /// Looks up a table by its SQL name, case-insensitively.
    pub fn table_by_name(&self, name: &str) -> Option<&TableDefinition> {
        self.tables
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Tables ordered so every foreign-key parent precedes its children.
    ///
    /// Tables on a reference cycle keep their declaration order relative to
    /// each other.
    pub fn dependency_order(&self) -> Vec<&TableDefinition> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.tables.len()).map(|i| graph.add_node(i)).collect();
        for (child, table) in self.tables.values().enumerate() {
            for fk in &table.foreign_keys {
                if let Some(parent) = self.tables.get_index_of(&fk.parent_entity) {
                    if parent != child {
                        graph.update_edge(nodes[parent], nodes[child], ());
                    }
                }
            }
        }

        // tarjan_scc yields components in reverse topological order.
        let mut order = Vec::with_capacity(self.tables.len());
        for mut component in tarjan_scc(&graph).into_iter().rev() {
            component.sort_by_key(|n| graph[*n]);
            for node in component {
                if let Some((_, table)) = self.tables.get_index(graph[node]) {
                    order.push(table);
                }
            }
        }
        order
    }

    /// DDL for a full schema creation, parents first.
    pub fn create_statements(&self) -> Vec<String> {
        self.dependency_order()
            .into_iter()
            .flat_map(TableDefinition::create_statements)
            .collect()
    }
}

fn build_table(
    entity: &EntityDescriptor,
    by_entity: &HashMap<&str, &EntityDescriptor>,
    registry: &ConverterRegistry,
    index_names: &mut HashSet<String>,
) -> Result<TableDefinition, SchemaError> {
    let entity_name = entity.name.clone();
    if entity.fields.is_empty() {
        return Err(SchemaError::EmptyEntity { entity: entity_name });
    }
    let table_name = entity.effective_table_name().to_string();
    let scope = [ConverterScope::Entity(entity.name.clone())];

    // Columns.
    let mut seen_columns: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(entity.fields.len());
    for field in &entity.fields {
        let name = field.effective_column_name().to_string();
        if !seen_columns.insert(name.to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateColumn {
                entity: entity_name,
                column: name,
            });
        }
        let storage_type = registry
            .converter_for(&field.domain_type, &scope)
            .map_err(|source| SchemaError::UnstorableField {
                entity: entity.name.clone(),
                field: field.name.clone(),
                source,
            })?
            .storage();
        columns.push(ColumnDefinition {
            field: field.name.clone(),
            name,
            domain_type: field.domain_type.clone(),
            storage_type,
            nullable: field.nullable,
            default: field.default.clone(),
        });
    }

    // Primary key.
    let pk = &entity.primary_key;
    if pk.fields.is_empty() {
        return Err(SchemaError::PrimaryKeyCollision {
            entity: entity_name,
            reason: "no primary key declared".to_string(),
        });
    }
    let mut pk_columns = Vec::with_capacity(pk.fields.len());
    for field_name in &pk.fields {
        let field = resolve_field(entity, field_name, "primary key")?;
        if field.nullable {
            return Err(SchemaError::PrimaryKeyCollision {
                entity: entity_name,
                reason: format!("primary key field '{}' is nullable", field_name),
            });
        }
        let column = field.effective_column_name().to_string();
        if pk_columns.contains(&column) {
            return Err(SchemaError::PrimaryKeyCollision {
                entity: entity_name,
                reason: format!("field '{}' appears twice in the primary key", field_name),
            });
        }
        pk_columns.push(column);
    }
    if pk.auto_generate {
        if pk_columns.len() != 1 {
            return Err(SchemaError::PrimaryKeyCollision {
                entity: entity_name,
                reason: "an auto-generated primary key must be a single field".to_string(),
            });
        }
        let backed_by_integer = columns
            .iter()
            .any(|c| c.name == pk_columns[0] && c.storage_type == StorageType::Integer);
        if !backed_by_integer {
            return Err(SchemaError::PrimaryKeyCollision {
                entity: entity_name,
                reason: format!(
                    "auto-generated primary key '{}' is not stored as INTEGER",
                    pk.fields[0]
                ),
            });
        }
    }

    // Indices.
    let mut indices = Vec::with_capacity(entity.indices.len());
    for index in &entity.indices {
        let mut index_columns = Vec::with_capacity(index.fields.len());
        for field_name in &index.fields {
            let field = resolve_field(entity, field_name, "index")?;
            index_columns.push(field.effective_column_name().to_string());
        }
        if index_columns.is_empty() {
            return Err(SchemaError::UnknownField {
                entity: entity_name,
                field_kind: "index".to_string(),
                field: String::new(),
            });
        }
        let name = index
            .name
            .clone()
            .unwrap_or_else(|| format!("index_{}_{}", table_name, index_columns.join("_")));
        if !index_names.insert(name.to_ascii_lowercase()) {
            return Err(SchemaError::DuplicateIndex {
                entity: entity_name,
                index: name,
            });
        }
        indices.push(IndexDefinition {
            name,
            columns: index_columns,
            unique: index.unique,
        });
    }

    // Foreign keys.
    let mut foreign_keys = Vec::with_capacity(entity.foreign_keys.len());
    for fk in &entity.foreign_keys {
        let parent = by_entity.get(fk.parent_entity.as_str()).ok_or_else(|| {
            SchemaError::UnknownForeignKeyTarget {
                entity: entity.name.clone(),
                target: fk.parent_entity.clone(),
            }
        })?;
        let invalid = |reason: String| SchemaError::InvalidForeignKey {
            entity: entity.name.clone(),
            target: fk.parent_entity.clone(),
            reason,
        };
        if fk.child_fields.is_empty() || fk.child_fields.len() != fk.parent_fields.len() {
            return Err(invalid(format!(
                "{} child field(s) reference {} parent field(s)",
                fk.child_fields.len(),
                fk.parent_fields.len()
            )));
        }
        let mut child_columns = Vec::with_capacity(fk.child_fields.len());
        for field_name in &fk.child_fields {
            let field = resolve_field(entity, field_name, "foreign key")?;
            child_columns.push(field.effective_column_name().to_string());
        }
        let mut parent_columns = Vec::with_capacity(fk.parent_fields.len());
        for field_name in &fk.parent_fields {
            let field = parent
                .find_field(field_name)
                .ok_or_else(|| invalid(format!("parent has no field '{}'", field_name)))?;
            parent_columns.push(field.effective_column_name().to_string());
        }
        if !references_unique_key(parent, &fk.parent_fields) {
            return Err(invalid(
                "parent fields are neither the primary key nor a unique index".to_string(),
            ));
        }
        foreign_keys.push(ForeignKeyDefinition {
            parent_entity: parent.name.clone(),
            parent_table: parent.effective_table_name().to_string(),
            parent_columns,
            child_columns,
            on_delete: fk.on_delete,
            on_update: fk.on_update,
            deferred: fk.deferred,
        });
    }

    Ok(TableDefinition {
        entity: entity.name.clone(),
        name: table_name,
        columns,
        primary_key: PrimaryKeyDefinition {
            columns: pk_columns,
            auto_generate: pk.auto_generate,
        },
        indices,
        foreign_keys,
    })
}

fn resolve_field<'a>(
    entity: &'a EntityDescriptor,
    field: &str,
    field_kind: &str,
) -> Result<&'a crate::descriptor::FieldDescriptor, SchemaError> {
    entity.find_field(field).ok_or_else(|| SchemaError::UnknownField {
        entity: entity.name.clone(),
        field_kind: field_kind.to_string(),
        field: field.to_string(),
    })
}

fn same_field_set(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&String> = a.iter().collect();
    let b: HashSet<&String> = b.iter().collect();
    a == b
}

fn references_unique_key(parent: &EntityDescriptor, fields: &[String]) -> bool {
    same_field_set(&parent.primary_key.fields, fields)
        || parent
            .indices
            .iter()
            .any(|idx| idx.unique && same_field_set(&idx.fields, fields))
}

// ---------------------------------------------------------------------------
// Table queries and DDL
// ---------------------------------------------------------------------------

impl TableDefinition {
    /// Finds a column by SQL name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_for_field(&self, field: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key
            .columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    /// The generated-key column, if the key is auto-generated.
    pub fn auto_key_column(&self) -> Option<&ColumnDefinition> {
        if !self.primary_key.auto_generate {
            return None;
        }
        self.primary_key.columns.first().and_then(|c| self.column(c))
    }

    pub fn create_table_sql(&self) -> String {
        let auto_key = self.auto_key_column().map(|c| c.name.as_str());
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                let mut def = format!("{} {}", quote_ident(&col.name), col.storage_type.sql_name());
                if Some(col.name.as_str()) == auto_key {
                    def.push_str(" PRIMARY KEY AUTOINCREMENT");
                }
                if !col.nullable {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = &col.default {
                    def.push_str(" DEFAULT ");
                    def.push_str(default);
                }
                def
            })
            .collect();
        if auto_key.is_none() {
            parts.push(format!("PRIMARY KEY({})", quote_list(&self.primary_key.columns)));
        }
        for fk in &self.foreign_keys {
            let mut clause = format!(
                "FOREIGN KEY({}) REFERENCES {}({}) ON UPDATE {} ON DELETE {}",
                quote_list(&fk.child_columns),
                quote_ident(&fk.parent_table),
                quote_list(&fk.parent_columns),
                fk.on_update.sql(),
                fk.on_delete.sql(),
            );
            if fk.deferred {
                clause.push_str(" DEFERRABLE INITIALLY DEFERRED");
            }
            parts.push(clause);
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            parts.join(", ")
        )
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        self.indices
            .iter()
            .map(|idx| {
                format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                    if idx.unique { "UNIQUE " } else { "" },
                    quote_ident(&idx.name),
                    quote_ident(&self.name),
                    quote_list(&idx.columns),
                )
            })
            .collect()
    }

    /// `CREATE TABLE` followed by its `CREATE INDEX` statements.
    pub fn create_statements(&self) -> Vec<String> {
        let mut out = vec![self.create_table_sql()];
        out.extend(self.create_index_sql());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, ForeignKeyDescriptor, IndexDescriptor};
    use proptest::prelude::*;

    fn item() -> EntityDescriptor {
        EntityDescriptor::new("Item")
            .table("items")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("name", DomainType::String))
            .field(FieldDescriptor::new("price", DomainType::F64))
            .auto_key("id")
            .index(IndexDescriptor::on(["name"]).unique())
    }

    fn order_line() -> EntityDescriptor {
        EntityDescriptor::new("OrderLine")
            .field(FieldDescriptor::new("order_id", DomainType::I64))
            .field(FieldDescriptor::new("item_id", DomainType::I64))
            .field(FieldDescriptor::new("qty", DomainType::I32))
            .key(["order_id", "item_id"])
            .foreign_key(
                ForeignKeyDescriptor::new("Item", ["id"], ["item_id"])
                    .on_delete(ForeignKeyAction::Cascade),
            )
    }

    fn build(entities: &[EntityDescriptor]) -> Result<SchemaModel, SchemaError> {
        SchemaModel::build(entities, 1, &ConverterRegistry::new())
    }

    #[test]
    fn forward_foreign_key_reference_resolves() {
        // OrderLine is declared before the Item it references.
        let model = build(&[order_line(), item()]).unwrap();
        assert_eq!(model.len(), 2);
        let fk = &model.table("OrderLine").unwrap().foreign_keys[0];
        assert_eq!(fk.parent_table, "items");
        let order: Vec<&str> = model.dependency_order().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["items", "OrderLine"], "parents must come first");
    }

    #[test]
    fn rejects_zero_field_entity() {
        let err = build(&[EntityDescriptor::new("Empty")]).unwrap_err();
        assert_eq!(err, SchemaError::EmptyEntity { entity: "Empty".into() });
    }

    #[test]
    fn rejects_duplicate_table_name() {
        let other = EntityDescriptor::new("Other")
            .table("ITEMS")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .key(["id"]);
        let err = build(&[item(), other]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTable { ref entity, .. } if entity == "Other"));
    }

    #[test]
    fn rejects_duplicate_column() {
        let e = EntityDescriptor::new("E")
            .field(FieldDescriptor::new("a", DomainType::I64))
            .field(FieldDescriptor::new("b", DomainType::I64).column("A"))
            .key(["a"]);
        assert!(matches!(build(&[e]).unwrap_err(), SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn rejects_unknown_foreign_key_target() {
        let err = build(&[order_line()]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownForeignKeyTarget {
                entity: "OrderLine".into(),
                target: "Item".into()
            }
        );
    }

    #[test]
    fn rejects_nullable_primary_key() {
        let e = EntityDescriptor::new("E")
            .field(FieldDescriptor::new("id", DomainType::I64).nullable())
            .key(["id"]);
        assert!(matches!(
            build(&[e]).unwrap_err(),
            SchemaError::PrimaryKeyCollision { .. }
        ));
    }

    #[test]
    fn rejects_text_auto_key() {
        let e = EntityDescriptor::new("E")
            .field(FieldDescriptor::new("id", DomainType::String))
            .auto_key("id");
        assert!(matches!(
            build(&[e]).unwrap_err(),
            SchemaError::PrimaryKeyCollision { .. }
        ));
    }

    #[test]
    fn rejects_foreign_key_to_non_unique_parent_fields() {
        let child = EntityDescriptor::new("C")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("price", DomainType::F64))
            .key(["id"])
            .foreign_key(ForeignKeyDescriptor::new("Item", ["price"], ["price"]));
        let err = build(&[item(), child]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidForeignKey { .. }));
    }

    #[test]
    fn unresolved_custom_type_is_unstorable() {
        let e = EntityDescriptor::new("E")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("at", DomainType::Custom("Timestamp".into())))
            .key(["id"]);
        let err = build(&[e]).unwrap_err();
        assert!(matches!(err, SchemaError::UnstorableField { ref field, .. } if field == "at"));
        assert_eq!(err.entity(), Some("E"));
    }

    #[test]
    fn version_zero_is_invalid() {
        let err = SchemaModel::build(&[item()], 0, &ConverterRegistry::new()).unwrap_err();
        assert_eq!(err, SchemaError::InvalidVersion { version: 0 });
    }

    #[test]
    fn ddl_for_auto_key_table() {
        let model = build(&[item()]).unwrap();
        let stmts = model.table("Item").unwrap().create_statements();
        assert_eq!(
            stmts[0],
            "CREATE TABLE IF NOT EXISTS \"items\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
             \"name\" TEXT NOT NULL, \"price\" REAL NOT NULL)"
        );
        assert_eq!(
            stmts[1],
            "CREATE UNIQUE INDEX IF NOT EXISTS \"index_items_name\" ON \"items\" (\"name\")"
        );
    }

    #[test]
    fn ddl_for_composite_key_and_foreign_key() {
        let model = build(&[item(), order_line()]).unwrap();
        let sql = model.table("OrderLine").unwrap().create_table_sql();
        assert!(sql.contains("PRIMARY KEY(\"order_id\", \"item_id\")"), "{}", sql);
        assert!(
            sql.contains("FOREIGN KEY(\"item_id\") REFERENCES \"items\"(\"id\") ON UPDATE NO ACTION ON DELETE CASCADE"),
            "{}",
            sql
        );
    }

    proptest! {
        #[test]
        fn table_count_equals_entity_count(n in 1usize..12) {
            let entities: Vec<EntityDescriptor> = (0..n)
                .map(|i| {
                    let mut e = EntityDescriptor::new(format!("E{}", i))
                        .field(FieldDescriptor::new("id", DomainType::I64))
                        .field(FieldDescriptor::new("parent", DomainType::I64).nullable())
                        .auto_key("id");
                    if i > 0 {
                        e = e.foreign_key(ForeignKeyDescriptor::new(
                            format!("E{}", i - 1),
                            ["id"],
                            ["parent"],
                        ));
                    }
                    e
                })
                .collect();
            let model = build(&entities).unwrap();
            prop_assert_eq!(model.len(), n);
            prop_assert_eq!(model.dependency_order().len(), n);
        }
    }
}
