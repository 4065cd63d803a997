//! Whole-schema DDL: creation from the schema model and destructive drop.

use rusqlite::Connection;
use tessera_core::ident::quote_ident;
use tessera_core::schema::SchemaModel;

use crate::error::StorageError;

/// Creates every table and index of `schema`, parents before children.
pub fn create_schema(conn: &Connection, schema: &SchemaModel) -> Result<(), StorageError> {
    for stmt in schema.create_statements() {
        tracing::debug!(sql = %stmt, "create");
        conn.execute_batch(&stmt)?;
    }
    Ok(())
}

/// Drops every declared table that exists, children before parents.
/// Indices go with their tables.
pub fn drop_schema(conn: &Connection, schema: &SchemaModel) -> Result<(), StorageError> {
    for table in schema.dependency_order().into_iter().rev() {
        tracing::debug!(table = %table.name, "drop");
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table.name)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::convert::ConverterRegistry;
    use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor, ForeignKeyDescriptor};
    use tessera_core::types::DomainType;

    fn count_tables(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('parent', 'child')",
            [],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn create_then_drop_with_foreign_keys_enforced() {
        // Child is declared first; creation order must still put the parent first.
        let child = EntityDescriptor::new("Child")
            .table("child")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("parent_id", DomainType::I64))
            .auto_key("id")
            .foreign_key(ForeignKeyDescriptor::new("Parent", ["id"], ["parent_id"]));
        let parent = EntityDescriptor::new("Parent")
            .table("parent")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .auto_key("id");
        let schema = SchemaModel::build(&[child, parent], 1, &ConverterRegistry::new()).unwrap();

        let conn = crate::connection::open_in_memory().unwrap();
        create_schema(&conn, &schema).unwrap();
        create_schema(&conn, &schema).unwrap();
        assert_eq!(count_tables(&conn), 2);

        conn.execute_batch(
            "INSERT INTO parent (id) VALUES (1);
             INSERT INTO child (parent_id) VALUES (1);",
        )
        .unwrap();
        drop_schema(&conn, &schema).unwrap();
        assert_eq!(count_tables(&conn), 0);
    }
}
