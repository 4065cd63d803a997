//! Bridging between tessera storage values and rusqlite values.

use rusqlite::types::{Value, ValueRef};
use rusqlite::{Row, Statement};
use tessera_core::value::StorageValue;

use crate::error::StorageError;

pub fn to_sql(value: &StorageValue) -> Value {
    match value {
        StorageValue::Null => Value::Null,
        StorageValue::Integer(i) => Value::Integer(*i),
        StorageValue::Real(r) => Value::Real(*r),
        StorageValue::Text(s) => Value::Text(s.clone()),
        StorageValue::Blob(b) => Value::Blob(b.clone()),
    }
}

pub fn from_sql(value: ValueRef<'_>) -> StorageValue {
    match value {
        ValueRef::Null => StorageValue::Null,
        ValueRef::Integer(i) => StorageValue::Integer(i),
        ValueRef::Real(r) => StorageValue::Real(r),
        ValueRef::Text(t) => StorageValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => StorageValue::Blob(b.to_vec()),
    }
}

/// Every column of `row`, in result order.
pub fn read_row(row: &Row<'_>, width: usize) -> Result<Vec<StorageValue>, rusqlite::Error> {
    (0..width).map(|i| row.get_ref(i).map(from_sql)).collect()
}

/// Result column names of a prepared statement.
pub fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(str::to_string).collect()
}

/// Executes a write statement with positional values, returning the number
/// of changed rows.
pub fn execute(conn: &rusqlite::Connection, sql: &str, values: &[StorageValue]) -> Result<usize, StorageError> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.execute(rusqlite::params_from_iter(values.iter().map(to_sql)))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn values_survive_a_table_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a, b, c, d, e)").unwrap();
        let values = vec![
            StorageValue::Null,
            StorageValue::Integer(-4),
            StorageValue::Real(2.5),
            StorageValue::Text("héllo".into()),
            StorageValue::Blob(vec![0, 255]),
        ];
        let changed = execute(&conn, "INSERT INTO t VALUES (?, ?, ?, ?, ?)", &values).unwrap();
        assert_eq!(changed, 1);

        let mut stmt = conn.prepare("SELECT a, b, c, d, e FROM t").unwrap();
        assert_eq!(column_names(&stmt), vec!["a", "b", "c", "d", "e"]);
        let back = stmt.query_row([], |row| read_row(row, 5)).unwrap();
        assert_eq!(back, values);
    }
}
