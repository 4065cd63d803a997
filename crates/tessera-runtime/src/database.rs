//! The database handle and its access objects.
//!
//! One writer connection behind an async mutex is the single serialization
//! point for every write; reads use a pool of read-only connections (file
//! databases) or queue on the writer (in-memory databases). All engine work
//! runs on tokio's blocking pool, so callers suspend instead of blocking a
//! runtime thread.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use tessera_codegen::{Arg, BoundStatement, GeneratedDatabase, GeneratedOperation, ResultPlan};
use tessera_core::convert::ConverterRegistry;
use tessera_core::database::DatabaseDescriptor;
use tessera_core::schema::SchemaModel;
use tessera_storage::ReconcileOutcome;
use tokio::sync::{broadcast, mpsc, Mutex, OwnedMutexGuard};
use tracing::Instrument;

use crate::cancel::{CancelOnDrop, CancellationToken};
use crate::config::DatabaseConfig;
use crate::error::RuntimeError;
use crate::exec::{self, Prepared};
use crate::pool::{Lease, ReaderPool};
use crate::result::CallResult;
use crate::stream::RowStream;
use crate::transaction::{Transaction, WriterGuard};

/// Tables changed by one committed write or transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub tables: BTreeSet<String>,
}

type Operations = HashMap<String, Arc<GeneratedOperation>>;

pub(crate) struct Inner {
    name: String,
    schema: SchemaModel,
    outcome: ReconcileOutcome,
    contracts: HashMap<String, Arc<Operations>>,
    pub(crate) writer: Arc<Mutex<Connection>>,
    readers: Option<Arc<ReaderPool>>,
    invalidation: broadcast::Sender<Invalidation>,
    stream_buffer: usize,
}

/// Shared handle to an open database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pub(crate) inner: Arc<Inner>,
}

impl Database {
    /// Generates the access surface for `descriptor`, opens the store and
    /// reconciles its schema. Any generation or reconciliation error is
    /// fatal and leaves nothing open.
    pub async fn open(
        config: DatabaseConfig,
        descriptor: &DatabaseDescriptor,
        registry: &ConverterRegistry,
    ) -> Result<Database, RuntimeError> {
        let generated = tessera_codegen::generate(descriptor, registry)?;
        Database::open_generated(config, generated).await
    }

    /// Opens the store for an already generated surface.
    pub async fn open_generated(config: DatabaseConfig, generated: GeneratedDatabase) -> Result<Database, RuntimeError> {
        let span = tracing::info_span!("open", database = %generated.name, path = ?config.path);
        let stream_buffer = config.stream_buffer.max(1);

        let (generated, writer, outcome, readers) = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            let timeout = config.busy_timeout();
            let mut writer = match &config.path {
                Some(path) => tessera_storage::open_database(path, timeout),
                None => tessera_storage::open_in_memory(),
            }
            .map_err(RuntimeError::Storage)?;
            let outcome = tessera_storage::reconcile(
                &mut writer,
                &generated.schema,
                &generated.migrations,
                config.reconcile_options(),
            )
            .map_err(RuntimeError::Storage)?;
            let readers = match &config.path {
                Some(path) if config.reader_connections > 0 => Some(Arc::new(ReaderPool::open(
                    path.clone(),
                    config.reader_connections,
                    timeout,
                )?)),
                _ => None,
            };
            tracing::info!(outcome = ?outcome, readers = config.reader_connections, "database opened");
            Ok::<_, RuntimeError>((generated, writer, outcome, readers))
        })
        .await??;

        let contracts = generated
            .contracts
            .into_iter()
            .map(|(name, contract)| {
                let ops: Operations = contract
                    .operations
                    .into_iter()
                    .map(|(op_name, op)| (op_name, Arc::new(op)))
                    .collect();
                (name, Arc::new(ops))
            })
            .collect();
        let (invalidation, _) = broadcast::channel(64);

        Ok(Database {
            inner: Arc::new(Inner {
                name: generated.name,
                schema: generated.schema,
                outcome,
                contracts,
                writer: Arc::new(Mutex::new(writer)),
                readers,
                invalidation,
                stream_buffer,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> u32 {
        self.inner.schema.version()
    }

    pub fn schema(&self) -> &SchemaModel {
        &self.inner.schema
    }

    /// What reconciliation did when the database was opened.
    pub fn reconcile_outcome(&self) -> &ReconcileOutcome {
        &self.inner.outcome
    }

    /// The access object for `contract`.
    pub fn dao(&self, contract: &str) -> Result<Dao, RuntimeError> {
        let operations = self
            .inner
            .contracts
            .get(contract)
            .ok_or_else(|| RuntimeError::UnknownContract(contract.to_string()))?;
        Ok(Dao {
            db: self.clone(),
            contract: contract.to_string(),
            operations: Arc::clone(operations),
        })
    }

    /// Notifications of tables changed by committed writes.
    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.inner.invalidation.subscribe()
    }

    /// Starts an explicit transaction, holding the writer until it is
    /// committed, rolled back or dropped.
    pub async fn begin(&self) -> Result<Transaction, RuntimeError> {
        self.begin_with(&CancellationToken::new()).await
    }

    pub async fn begin_with(&self, cancel: &CancellationToken) -> Result<Transaction, RuntimeError> {
        let guard = self.lock_writer(cancel).await?;
        let conn = tokio::task::spawn_blocking(move || -> Result<WriterGuard, RuntimeError> {
            let conn = WriterGuard::new(guard);
            conn.execute_batch("BEGIN IMMEDIATE")?;
            Ok(conn)
        })
        .await??;
        tracing::debug!(database = %self.inner.name, "transaction started");
        Ok(Transaction::new(self.clone(), conn))
    }

    pub(crate) fn operation(&self, contract: &str, operation: &str) -> Result<Arc<GeneratedOperation>, RuntimeError> {
        self.inner
            .contracts
            .get(contract)
            .and_then(|ops| ops.get(operation))
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownOperation {
                contract: contract.to_string(),
                operation: operation.to_string(),
            })
    }

    pub(crate) fn announce(&self, tables: BTreeSet<String>) {
        announce(&self.inner.invalidation, tables);
    }

    /// Waits for the writer, giving up if `cancel` fires first.
    pub(crate) async fn lock_writer(&self, cancel: &CancellationToken) -> Result<OwnedMutexGuard<Connection>, RuntimeError> {
        cancel.check()?;
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            guard = Arc::clone(&self.inner.writer).lock_owned() => guard,
        };
        // Cancellation that raced the acquisition still wins.
        cancel.check()?;
        Ok(guard)
    }

    async fn dispatch(
        &self,
        op: Arc<GeneratedOperation>,
        args: &[Arg],
        cancel: &CancellationToken,
    ) -> Result<CallResult, RuntimeError> {
        let prepared = Prepared::bind(&op, args)?;
        cancel.check()?;

        let token = cancel.child();
        let scope = CancelOnDrop::new(token.clone());
        let result = match prepared {
            Prepared::Query(bound) if !op.is_write() => self.read(op, bound, &token).await,
            prepared => self.write(op, prepared, &token).await,
        };
        scope.disarm();
        result
    }

    async fn write(
        &self,
        op: Arc<GeneratedOperation>,
        prepared: Prepared,
        cancel: &CancellationToken,
    ) -> Result<CallResult, RuntimeError> {
        let guard = self.lock_writer(cancel).await?;
        let token = cancel.clone();
        let notify = self.inner.invalidation.clone();
        tokio::task::spawn_blocking(move || -> Result<CallResult, RuntimeError> {
            let mut conn = WriterGuard::new(guard);
            exec::watch(&conn, &token);
            let result = (|| -> Result<exec::Output, RuntimeError> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let output = exec::run(&tx, &op, &prepared, &token)?;
                token.check()?;
                tx.commit()?;
                Ok(output)
            })();
            exec::unwatch(&conn);
            let output = result.inspect_err(|e: &RuntimeError| {
                tracing::debug!(operation = %op.name, error = %e, "write rolled back");
            })?;
            announce(&notify, op.written_tables());
            Ok(output.into_call_result(&op.result))
        })
        .await?
    }

    async fn read(
        &self,
        op: Arc<GeneratedOperation>,
        bound: BoundStatement,
        cancel: &CancellationToken,
    ) -> Result<CallResult, RuntimeError> {
        let Some(pool) = &self.inner.readers else {
            let guard = self.lock_writer(cancel).await?;
            let token = cancel.clone();
            return tokio::task::spawn_blocking(move || -> Result<CallResult, RuntimeError> {
                let conn = guard;
                exec::watch(&conn, &token);
                let result = exec::query(&conn, &op, &bound, &token);
                exec::unwatch(&conn);
                Ok(result?.into_call_result(&op.result))
            })
            .await?;
        };

        let lease = pool.acquire(cancel).await?;
        if matches!(op.result, ResultPlan::Entity { many: true, .. } | ResultPlan::Rows) {
            return Ok(CallResult::Stream(self.stream(lease, op, bound, cancel.clone())));
        }
        let token = cancel.clone();
        tokio::task::spawn_blocking(move || -> Result<CallResult, RuntimeError> {
            let mut lease = lease;
            let conn = lease.connection()?;
            exec::watch(conn, &token);
            let result = exec::query(conn, &op, &bound, &token);
            exec::unwatch(conn);
            Ok(result?.into_call_result(&op.result))
        })
        .await?
    }

    /// Starts a worker that owns `lease` and pushes rows into a bounded
    /// channel until the rows run out, the stream is dropped or `cancel`
    /// fires.
    fn stream(&self, lease: Lease, op: Arc<GeneratedOperation>, bound: BoundStatement, cancel: CancellationToken) -> RowStream {
        let (tx, rx) = mpsc::channel(self.inner.stream_buffer);
        let span = tracing::debug_span!("stream", operation = %op.name);
        tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            let mut lease = lease;
            let result = lease.connection().and_then(|conn| {
                exec::watch(conn, &cancel);
                let result = exec::stream(conn, &op, &bound, &cancel, &tx);
                exec::unwatch(conn);
                result
            });
            if let Err(err) = result {
                // The consumer may already be gone; then nobody is waiting
                // for the error either.
                let _ = tx.blocking_send(Err(err));
            }
        });
        RowStream::channel(rx)
    }
}

fn announce(sender: &broadcast::Sender<Invalidation>, tables: BTreeSet<String>) {
    if tables.is_empty() {
        return;
    }
    tracing::debug!(tables = ?tables, "tables invalidated");
    // Err only means there are no subscribers right now.
    let _ = sender.send(Invalidation { tables });
}

/// A contract's operations, callable by name.
#[derive(Clone)]
pub struct Dao {
    db: Database,
    contract: String,
    operations: Arc<Operations>,
}

impl Dao {
    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn has_operation(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    /// Calls `operation` with `args` in declaration order.
    pub async fn call(&self, operation: &str, args: Vec<Arg>) -> Result<CallResult, RuntimeError> {
        self.call_with(operation, args, &CancellationToken::new()).await
    }

    /// Like [`Dao::call`], cancelled when `cancel` fires. A cancelled call
    /// leaves no trace in the database.
    pub async fn call_with(
        &self,
        operation: &str,
        args: Vec<Arg>,
        cancel: &CancellationToken,
    ) -> Result<CallResult, RuntimeError> {
        let op = self
            .operations
            .get(operation)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownOperation {
                contract: self.contract.clone(),
                operation: operation.to_string(),
            })?;
        let span = tracing::debug_span!("call", contract = %self.contract, operation);
        self.db.dispatch(op, &args, cancel).instrument(span).await
    }
}
