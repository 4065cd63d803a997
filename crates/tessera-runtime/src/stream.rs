//! Lazy, single-pass result sequences.

use std::collections::VecDeque;

use tessera_core::record::Record;
use tokio::sync::mpsc;

use crate::error::RuntimeError;

/// A forward-only sequence of result rows.
///
/// Rows from a reader connection arrive through a bounded channel fed by
/// the worker holding the cursor; dropping the stream stops the cursor.
/// Rows produced inside a write transaction are buffered, since they only
/// become visible after commit. Either way the stream is consumed once.
#[derive(Debug)]
pub struct RowStream {
    source: Source,
}

#[derive(Debug)]
enum Source {
    Buffered(VecDeque<Record>),
    Channel(mpsc::Receiver<Result<Record, RuntimeError>>),
}

impl RowStream {
    pub(crate) fn buffered(rows: Vec<Record>) -> Self {
        RowStream {
            source: Source::Buffered(rows.into()),
        }
    }

    pub(crate) fn channel(rx: mpsc::Receiver<Result<Record, RuntimeError>>) -> Self {
        RowStream {
            source: Source::Channel(rx),
        }
    }

    /// The next row, `None` once exhausted. An error ends the stream.
    pub async fn next(&mut self) -> Option<Result<Record, RuntimeError>> {
        match &mut self.source {
            Source::Buffered(rows) => rows.pop_front().map(Ok),
            Source::Channel(rx) => rx.recv().await,
        }
    }

    /// Drains the remaining rows, stopping at the first error.
    pub async fn try_collect(mut self) -> Result<Vec<Record>, RuntimeError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffered_rows_are_consumed_once() {
        let mut stream = RowStream::buffered(vec![Record::new().with("n", 1i64), Record::new().with("n", 2i64)]);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.get_as::<i64>("n").unwrap(), 1);
        let rest = stream.try_collect().await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn channel_error_stops_collection() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Record::new())).await.unwrap();
        tx.send(Err(RuntimeError::Cancelled)).await.unwrap();
        drop(tx);
        let err = RowStream::channel(rx).try_collect().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
    }
}
