//! Synchronous statement execution on a borrowed connection.
//!
//! Everything here runs on a blocking worker and never manages transactions
//! itself; callers wrap it in a transaction or savepoint. Cancellation is
//! checked between batch items and between rows, and inside long statements
//! through the connection's progress handler (see [`watch`]).

use std::panic::AssertUnwindSafe;

use rusqlite::Connection;
use tessera_codegen::materialize::{read_scalar, read_untyped, LocatedReader};
use tessera_codegen::{Arg, BoundStatement, GeneratedOperation, OperationStatement, ResultPlan, WriteKind};
use tessera_core::record::Record;
use tessera_core::value::{DomainValue, StorageValue};
use tessera_storage::values::{column_names, execute, read_row, to_sql};
use tokio::sync::mpsc;

use crate::cancel::CancellationToken;
use crate::error::RuntimeError;
use crate::result::CallResult;
use crate::stream::RowStream;

/// Arguments converted to storage values, ready to run.
#[derive(Debug, Clone)]
pub(crate) enum Prepared {
    Query(BoundStatement),
    Write { kind: WriteKind, sql: String, rows: Vec<Vec<StorageValue>> },
}

impl Prepared {
    /// Binds `args` for `op`. Pure conversion; no I/O.
    pub(crate) fn bind(op: &GeneratedOperation, args: &[Arg]) -> Result<Prepared, RuntimeError> {
        match &op.statement {
            OperationStatement::Query(binder) => Ok(Prepared::Query(binder.bind(args)?)),
            OperationStatement::Write(stmt) => {
                let rows = stmt
                    .entities(args)?
                    .into_iter()
                    .map(|entity| stmt.bind(entity))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Prepared::Write {
                    kind: stmt.kind,
                    sql: stmt.sql.clone(),
                    rows,
                })
            }
        }
    }
}

/// One mapped result row.
pub(crate) enum Mapped {
    Record(Record),
    Value(DomainValue),
}

/// Collected output of a statement run to completion.
#[derive(Debug)]
pub(crate) enum Output {
    Unit,
    RowCount(u64),
    Key(i64),
    Keys(Vec<i64>),
    Records(Vec<Record>),
    Values(Vec<DomainValue>),
}

impl Output {
    pub(crate) fn into_call_result(self, plan: &ResultPlan) -> CallResult {
        match self {
            Output::Unit => CallResult::Unit,
            Output::RowCount(n) => CallResult::RowCount(n),
            Output::Key(k) => CallResult::Key(k),
            Output::Keys(ks) => CallResult::Keys(ks),
            Output::Records(records) if plan.is_many() => CallResult::Stream(RowStream::buffered(records)),
            Output::Records(records) => CallResult::Entity(records.into_iter().next()),
            Output::Values(values) if plan.is_many() => CallResult::Scalars(values),
            Output::Values(values) => CallResult::Scalar(values.into_iter().next().filter(|v| !v.is_null())),
        }
    }
}

/// Runs `prepared` to completion on `conn`.
pub(crate) fn run(
    conn: &Connection,
    op: &GeneratedOperation,
    prepared: &Prepared,
    cancel: &CancellationToken,
) -> Result<Output, RuntimeError> {
    match prepared {
        Prepared::Write { kind, sql, rows } => {
            let mut changed = 0u64;
            let mut keys = Vec::with_capacity(rows.len());
            for values in rows {
                cancel.check()?;
                changed += execute(conn, sql, values)? as u64;
                if *kind == WriteKind::Insert {
                    keys.push(conn.last_insert_rowid());
                }
            }
            Ok(match &op.result {
                ResultPlan::RowCount => Output::RowCount(changed),
                ResultPlan::InsertedKey => Output::Key(conn.last_insert_rowid()),
                ResultPlan::InsertedKeys => Output::Keys(keys),
                _ => Output::Unit,
            })
        }
        Prepared::Query(bound) => query(conn, op, bound, cancel),
    }
}

/// Runs a raw query to completion, collecting any rows it returns.
pub(crate) fn query(
    conn: &Connection,
    op: &GeneratedOperation,
    bound: &BoundStatement,
    cancel: &CancellationToken,
) -> Result<Output, RuntimeError> {
    if !op.result.reads_rows() {
        cancel.check()?;
        let changed = execute(conn, &bound.sql, &bound.values)? as u64;
        return Ok(match op.result {
            ResultPlan::RowCount => Output::RowCount(changed),
            ResultPlan::InsertedKey => Output::Key(conn.last_insert_rowid()),
            _ => Output::Unit,
        });
    }

    // A single-row result only needs its first row, unless the statement
    // writes (RETURNING) and must run to completion.
    let first_only = !op.result.is_many() && !op.is_write();
    let mut records = Vec::new();
    let mut scalars = Vec::new();
    scan(conn, &bound.sql, &bound.values, &op.result, cancel, |mapped| {
        match mapped {
            Mapped::Record(r) => records.push(r),
            Mapped::Value(v) => scalars.push(v),
        }
        !first_only
    })?;
    Ok(match op.result {
        ResultPlan::Scalar { .. } => Output::Values(scalars),
        _ => Output::Records(records),
    })
}

/// Feeds the rows of a read into `tx` as they are stepped. Stops quietly
/// when the receiving stream is dropped.
pub(crate) fn stream(
    conn: &Connection,
    op: &GeneratedOperation,
    bound: &BoundStatement,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<Result<Record, RuntimeError>>,
) -> Result<(), RuntimeError> {
    scan(conn, &bound.sql, &bound.values, &op.result, cancel, |mapped| match mapped {
        Mapped::Record(r) => tx.blocking_send(Ok(r)).is_ok(),
        Mapped::Value(_) => true,
    })
}

/// Number of VM instructions between cancellation polls.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Makes statements on `conn` fail with an interrupt once `cancel` fires.
/// Stays installed until [`unwatch`].
pub(crate) fn watch(conn: &Connection, cancel: &CancellationToken) {
    let token = AssertUnwindSafe(cancel.clone());
    conn.progress_handler(PROGRESS_INTERVAL, Some(move || token.is_cancelled()));
}

pub(crate) fn unwatch(conn: &Connection) {
    conn.progress_handler(0, None::<fn() -> bool>);
}

/// Steps through the rows of `sql`, handing each mapped row to `sink`
/// until it returns `false` or the rows run out.
pub(crate) fn scan(
    conn: &Connection,
    sql: &str,
    values: &[StorageValue],
    plan: &ResultPlan,
    cancel: &CancellationToken,
    mut sink: impl FnMut(Mapped) -> bool,
) -> Result<(), RuntimeError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns = column_names(&stmt);
    let width = columns.len();
    let located: Option<LocatedReader<'_>> = match plan {
        ResultPlan::Entity { reader, .. } => Some(reader.locate(&columns)),
        _ => None,
    };
    let mut rows = stmt.query(rusqlite::params_from_iter(values.iter().map(to_sql)))?;
    while let Some(row) = rows.next()? {
        cancel.check()?;
        let values = read_row(row, width)?;
        let mapped = match (plan, &located) {
            (_, Some(reader)) => Mapped::Record(reader.read(&values)?),
            (ResultPlan::Scalar { converter, .. }, None) => Mapped::Value(read_scalar(converter, &values)?),
            _ => Mapped::Record(read_untyped(&columns, values)),
        };
        if !sink(mapped) {
            break;
        }
    }
    Ok(())
}
