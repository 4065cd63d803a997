//! Reads the persisted shape of tables back from SQLite and compares it
//! with the declared [`TableDefinition`]s.
//!
//! Comparison is by name (case-insensitive), declared type affinity,
//! nullability, declared defaults, primary key order, explicit indices and
//! foreign keys. Every difference is reported as one readable line.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tessera_core::schema::{SchemaModel, TableDefinition};
use tessera_core::types::StorageType;

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedColumn {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    /// 1-based position in the primary key, 0 if not part of it.
    pub pk: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedIndex {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedForeignKey {
    pub parent_table: String,
    pub child_columns: Vec<String>,
    pub parent_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTable {
    pub name: String,
    pub columns: Vec<PersistedColumn>,
    pub indices: Vec<PersistedIndex>,
    pub foreign_keys: Vec<PersistedForeignKey>,
}

impl PersistedTable {
    fn column(&self, name: &str) -> Option<&PersistedColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn primary_key(&self) -> Vec<&str> {
        let mut pk: Vec<&PersistedColumn> = self.columns.iter().filter(|c| c.pk > 0).collect();
        pk.sort_by_key(|c| c.pk);
        pk.into_iter().map(|c| c.name.as_str()).collect()
    }
}

/// Reads the structure of `table`; `None` if no such table exists.
pub fn read_table(conn: &Connection, table: &str) -> Result<Option<PersistedTable>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![table], |row| {
            Ok(PersistedColumn {
                name: row.get(0)?,
                declared_type: row.get(1)?,
                not_null: row.get(2)?,
                default: row.get(3)?,
                pk: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Ok(None);
    }

    // Only explicitly created indices; autoindexes backing PRIMARY KEY and
    // UNIQUE constraints are covered by the key comparison.
    let mut stmt =
        conn.prepare_cached("SELECT name, \"unique\" FROM pragma_index_list(?1) WHERE origin = 'c' ORDER BY name")?;
    let listed = stmt
        .query_map(params![table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut indices = Vec::with_capacity(listed.len());
    for (name, unique) in listed {
        let mut stmt = conn.prepare_cached("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
        let columns = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        indices.push(PersistedIndex { name, unique, columns });
    }

    let mut stmt = conn.prepare_cached(
        "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut grouped: BTreeMap<i64, PersistedForeignKey> = BTreeMap::new();
    for (id, parent, from, to, on_update, on_delete) in rows {
        let fk = grouped.entry(id).or_insert_with(|| PersistedForeignKey {
            parent_table: parent,
            child_columns: Vec::new(),
            parent_columns: Vec::new(),
            on_update,
            on_delete,
        });
        fk.child_columns.push(from);
        fk.parent_columns.push(to.unwrap_or_default());
    }

    Ok(Some(PersistedTable {
        name: table.to_string(),
        columns,
        indices,
        foreign_keys: grouped.into_values().collect(),
    }))
}

/// Differences between every declared table and its persisted counterpart.
pub fn verify_schema(conn: &Connection, schema: &SchemaModel) -> Result<Vec<String>, StorageError> {
    let mut differences = Vec::new();
    for table in schema.tables() {
        match read_table(conn, &table.name)? {
            Some(persisted) => differences.extend(compare(table, &persisted)),
            None => differences.push(format!("table '{}' does not exist", table.name)),
        }
    }
    Ok(differences)
}

/// Differences between one declared table and its persisted structure.
pub fn compare(declared: &TableDefinition, persisted: &PersistedTable) -> Vec<String> {
    let t = &declared.name;
    let mut out = Vec::new();

    for col in &declared.columns {
        let Some(found) = persisted.column(&col.name) else {
            out.push(format!("table '{}' is missing column '{}'", t, col.name));
            continue;
        };
        if StorageType::from_declared(&found.declared_type) != Some(col.storage_type) {
            out.push(format!(
                "column '{}.{}' is declared {} but stored as '{}'",
                t, col.name, col.storage_type, found.declared_type
            ));
        }
        // SQLite does not report NOT NULL for INTEGER PRIMARY KEY aliases.
        if !declared.is_primary_key(&col.name) && found.not_null == col.nullable {
            out.push(format!(
                "column '{}.{}' nullability differs (declared {})",
                t,
                col.name,
                if col.nullable { "NULL" } else { "NOT NULL" }
            ));
        }
        if let Some(default) = &col.default {
            let stored = found.default.as_deref().map(normalize_default);
            if stored.as_deref() != Some(normalize_default(default).as_str()) {
                out.push(format!(
                    "column '{}.{}' default differs (declared {}, stored {})",
                    t,
                    col.name,
                    default,
                    found.default.as_deref().unwrap_or("none")
                ));
            }
        }
    }
    for found in &persisted.columns {
        if declared.column(&found.name).is_none() {
            out.push(format!("table '{}' has undeclared column '{}'", t, found.name));
        }
    }

    let pk = persisted.primary_key();
    if !same_names(&declared.primary_key.columns, &pk) {
        out.push(format!(
            "table '{}' primary key differs (declared {:?}, stored {:?})",
            t, declared.primary_key.columns, pk
        ));
    }

    for idx in &declared.indices {
        match persisted.indices.iter().find(|i| i.name.eq_ignore_ascii_case(&idx.name)) {
            None => out.push(format!("table '{}' is missing index '{}'", t, idx.name)),
            Some(found) => {
                if found.unique != idx.unique || !same_names(&idx.columns, &found.columns) {
                    out.push(format!("index '{}' on '{}' differs", idx.name, t));
                }
            }
        }
    }
    for found in &persisted.indices {
        if !declared.indices.iter().any(|i| i.name.eq_ignore_ascii_case(&found.name)) {
            out.push(format!("table '{}' has undeclared index '{}'", t, found.name));
        }
    }

    for fk in &declared.foreign_keys {
        let matched = persisted.foreign_keys.iter().any(|p| {
            p.parent_table.eq_ignore_ascii_case(&fk.parent_table)
                && same_names(&fk.child_columns, &p.child_columns)
                && same_names(&fk.parent_columns, &p.parent_columns)
                && p.on_delete.eq_ignore_ascii_case(fk.on_delete.sql())
                && p.on_update.eq_ignore_ascii_case(fk.on_update.sql())
        });
        if !matched {
            out.push(format!(
                "table '{}' is missing foreign key ({}) -> {}",
                t,
                fk.child_columns.join(", "),
                fk.parent_table
            ));
        }
    }
    if persisted.foreign_keys.len() > declared.foreign_keys.len() {
        out.push(format!("table '{}' has undeclared foreign keys", t));
    }

    out
}

fn same_names<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.as_ref().eq_ignore_ascii_case(y.as_ref()))
}

fn normalize_default(text: &str) -> String {
    let mut s = text.trim();
    while s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        s = s[1..s.len() - 1].trim();
    }
    s.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::convert::ConverterRegistry;
    use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor, ForeignKeyDescriptor, IndexDescriptor};
    use tessera_core::types::DomainType;

    fn schema() -> SchemaModel {
        let item = EntityDescriptor::new("Item")
            .table("items")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("name", DomainType::String))
            .field(FieldDescriptor::new("price", DomainType::F64).default_value("0"))
            .auto_key("id")
            .index(IndexDescriptor::on(["name"]).unique());
        let line = EntityDescriptor::new("Line")
            .table("lines")
            .field(FieldDescriptor::new("item_id", DomainType::I64))
            .field(FieldDescriptor::new("qty", DomainType::I32))
            .key(["item_id"])
            .foreign_key(ForeignKeyDescriptor::new("Item", ["id"], ["item_id"]));
        SchemaModel::build(&[item, line], 1, &ConverterRegistry::new()).unwrap()
    }

    fn created(schema: &SchemaModel) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in schema.create_statements() {
            conn.execute_batch(&stmt).unwrap();
        }
        conn
    }

    #[test]
    fn freshly_created_schema_matches() {
        let schema = schema();
        let conn = created(&schema);
        let differences = verify_schema(&conn, &schema).unwrap();
        assert!(differences.is_empty(), "unexpected differences: {:?}", differences);
    }

    #[test]
    fn reads_keys_indices_and_foreign_keys() {
        let schema = schema();
        let conn = created(&schema);
        let items = read_table(&conn, "items").unwrap().unwrap();
        assert_eq!(items.primary_key(), vec!["id"]);
        assert_eq!(items.indices.len(), 1);
        assert!(items.indices[0].unique);

        let lines = read_table(&conn, "lines").unwrap().unwrap();
        assert_eq!(lines.foreign_keys.len(), 1);
        assert_eq!(lines.foreign_keys[0].parent_table, "items");
        assert_eq!(lines.foreign_keys[0].on_delete, "NO ACTION");

        assert!(read_table(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn reports_drift() {
        let schema = schema();
        let conn = created(&schema);
        conn.execute_batch(
            "ALTER TABLE items ADD COLUMN colour TEXT;
             DROP INDEX \"index_items_name\";",
        )
        .unwrap();
        let differences = verify_schema(&conn, &schema).unwrap();
        assert!(
            differences.iter().any(|d| d.contains("undeclared column 'colour'")),
            "{:?}",
            differences
        );
        assert!(
            differences.iter().any(|d| d.contains("missing index")),
            "{:?}",
            differences
        );
    }

    #[test]
    fn type_and_default_changes_are_drift() {
        let schema = schema();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, price TEXT NOT NULL DEFAULT 1);
             CREATE UNIQUE INDEX index_items_name ON items (name);",
        )
        .unwrap();
        let table = schema.table("Item").unwrap();
        let differences = compare(table, &read_table(&conn, "items").unwrap().unwrap());
        assert_eq!(differences.len(), 2, "{:?}", differences);
    }

    #[test]
    fn defaults_are_normalized() {
        assert_eq!(normalize_default("(0)"), "0");
        assert_eq!(normalize_default(" CURRENT_TIMESTAMP "), "current_timestamp");
    }
}
