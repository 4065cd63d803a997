//! Explicit transactions.
//!
//! A [`Transaction`] owns the writer connection from `begin` until commit,
//! rollback or drop, so its calls run in submission order with no other
//! write interleaved. Each call runs inside its own savepoint: a failed call
//! undoes only itself and the transaction stays usable, while a cancelled
//! call rolls back the whole transaction.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use rusqlite::Connection;
use tessera_codegen::Arg;
use tokio::sync::OwnedMutexGuard;
use tracing::Instrument;

use crate::cancel::{CancelOnDrop, CancellationToken};
use crate::database::Database;
use crate::error::RuntimeError;
use crate::exec::{self, Output, Prepared};
use crate::result::CallResult;

/// The locked writer connection. Rolls back any transaction still open on
/// it when released, so an abandoned call can never leak a half-applied
/// write to the next writer.
pub(crate) struct WriterGuard(OwnedMutexGuard<Connection>);

impl WriterGuard {
    pub(crate) fn new(guard: OwnedMutexGuard<Connection>) -> Self {
        WriterGuard(guard)
    }
}

impl Deref for WriterGuard {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl DerefMut for WriterGuard {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.0
    }
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        if !self.0.is_autocommit() {
            tracing::debug!("releasing writer with an open transaction; rolling back");
            if let Err(err) = self.0.execute_batch("ROLLBACK") {
                tracing::error!(error = %err, "rollback of abandoned transaction failed");
            }
        }
    }
}

pub struct Transaction {
    db: Database,
    conn: Option<WriterGuard>,
    /// Tables written so far, announced on commit.
    written: BTreeSet<String>,
}

impl Transaction {
    pub(crate) fn new(db: Database, conn: WriterGuard) -> Self {
        Transaction {
            db,
            conn: Some(conn),
            written: BTreeSet::new(),
        }
    }

    /// False once committed, rolled back or aborted by cancellation.
    pub fn is_active(&self) -> bool {
        self.conn.is_some()
    }

    pub async fn call(&mut self, contract: &str, operation: &str, args: Vec<Arg>) -> Result<CallResult, RuntimeError> {
        self.call_with(contract, operation, args, &CancellationToken::new()).await
    }

    pub async fn call_with(
        &mut self,
        contract: &str,
        operation: &str,
        args: Vec<Arg>,
        cancel: &CancellationToken,
    ) -> Result<CallResult, RuntimeError> {
        let op = self.db.operation(contract, operation)?;
        let prepared = Prepared::bind(&op, &args)?;
        cancel.check()?;
        let conn = self.conn.take().ok_or(RuntimeError::TransactionFinished)?;

        let token = cancel.child();
        let scope = CancelOnDrop::new(token.clone());
        let worker_op = Arc::clone(&op);
        let span = tracing::debug_span!("call", contract, operation, transaction = true);
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let mut conn = conn;
            exec::watch(&conn, &token);
            let result = (|| -> Result<Output, RuntimeError> {
                let savepoint = conn.savepoint()?;
                let output = exec::run(&savepoint, &worker_op, &prepared, &token)?;
                token.check()?;
                savepoint.commit()?;
                Ok(output)
            })();
            exec::unwatch(&conn);
            match result {
                Err(RuntimeError::Cancelled) => {
                    // Dropping the guard rolls the whole transaction back.
                    drop(conn);
                    (None, Err(RuntimeError::Cancelled))
                }
                other => (Some(conn), other),
            }
        })
        .instrument(span)
        .await?;
        scope.disarm();

        self.conn = conn;
        let output = result?;
        self.written.extend(op.written_tables());
        Ok(output.into_call_result(&op.result))
    }

    pub async fn commit(mut self) -> Result<(), RuntimeError> {
        let conn = self.conn.take().ok_or(RuntimeError::TransactionFinished)?;
        tokio::task::spawn_blocking(move || -> Result<(), RuntimeError> {
            // On failure the guard's drop rolls back.
            conn.execute_batch("COMMIT")?;
            Ok(())
        })
        .await??;
        tracing::debug!(tables = ?self.written, "transaction committed");
        self.db.announce(std::mem::take(&mut self.written));
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), RuntimeError> {
        let conn = self.conn.take().ok_or(RuntimeError::TransactionFinished)?;
        tokio::task::spawn_blocking(move || -> Result<(), RuntimeError> {
            conn.execute_batch("ROLLBACK")?;
            Ok(())
        })
        .await??;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!("transaction dropped without commit");
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || drop(conn));
                }
                Err(_) => drop(conn),
            }
        }
    }
}
