//! Connection setup for the embedded store.
//!
//! Every connection gets the same pragmas: WAL journaling (file databases),
//! `synchronous = NORMAL`, enforced foreign keys and a busy timeout so a
//! reader waiting on a checkpoint does not fail immediately.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use crate::error::StorageError;

/// Opens (or creates) the read-write connection for a file database.
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    configure(&conn, busy_timeout, true)?;
    Ok(conn)
}

/// Opens a read-only connection to an existing file database.
pub fn open_reader(path: &Path, busy_timeout: Duration) -> Result<Connection, StorageError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    configure(&conn, busy_timeout, false)?;
    Ok(conn)
}

/// Opens a private in-memory database.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, Duration::ZERO, true)?;
    Ok(conn)
}

fn configure(conn: &Connection, busy_timeout: Duration, writer: bool) -> Result<(), StorageError> {
    if writer {
        // No-op for in-memory databases, which always report "memory".
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
