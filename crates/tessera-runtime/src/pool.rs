//! Read-only connection pool.
//!
//! A semaphore bounds concurrent readers; idle connections wait in a plain
//! list. A lease whose connection was lost (worker panic) is refilled by
//! opening a fresh connection on the next acquisition.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::cancel::CancellationToken;
use crate::error::RuntimeError;

pub(crate) struct ReaderPool {
    path: PathBuf,
    busy_timeout: Duration,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    pub(crate) fn open(path: PathBuf, size: usize, busy_timeout: Duration) -> Result<Self, RuntimeError> {
        let idle = (0..size)
            .map(|_| tessera_storage::open_reader(&path, busy_timeout).map_err(RuntimeError::Storage))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReaderPool {
            path,
            busy_timeout,
            permits: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(idle),
        })
    }

    /// Waits for a free reader, giving up if `cancel` fires first.
    pub(crate) async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> Result<Lease, RuntimeError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| RuntimeError::Worker("reader pool closed".to_string()))?
            }
        };
        let conn = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        Ok(Lease {
            pool: Arc::clone(self),
            conn,
            _permit: permit,
        })
    }
}

/// Exclusive use of one reader connection; returned to the pool on drop.
pub(crate) struct Lease {
    pool: Arc<ReaderPool>,
    conn: Option<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    pub(crate) fn connection(&mut self) -> Result<&Connection, RuntimeError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                tracing::debug!("opening replacement reader connection");
                tessera_storage::open_reader(&self.pool.path, self.pool.busy_timeout)?
            }
        };
        Ok(self.conn.insert(conn))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().unwrap_or_else(PoisonError::into_inner).push(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leases_are_bounded_and_recycled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        tessera_storage::open_database(&path, Duration::from_millis(100))
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();
        let pool = Arc::new(ReaderPool::open(path, 1, Duration::from_millis(100)).unwrap());
        let token = CancellationToken::new();

        let mut lease = pool.acquire(&token).await.unwrap();
        let n: i64 = lease
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);

        // Pool exhausted: a cancelled waiter gives up instead of blocking.
        let waiting = token.child();
        waiting.cancel();
        assert!(matches!(pool.acquire(&waiting).await, Err(RuntimeError::Cancelled)));

        drop(lease);
        assert_eq!(pool.idle.lock().unwrap().len(), 1);
        assert!(pool.acquire(&token).await.is_ok());
    }
}
