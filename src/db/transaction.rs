//! Transaction coordinator.
//!
//! A transaction block runs caller logic on one dedicated lease between an
//! explicit `BEGIN` and a `COMMIT`, or a `ROLLBACK` when any step fails.
//! Statements issued inside the block are never retried: a retry on a fresh
//! connection would silently drop the statements that came before it.

use std::time::Instant;

use futures_util::future::BoxFuture;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::lease::Lease;
use crate::db::pool::ConnectionPool;
use crate::error::{BoxError, DbError, DbResult, TransactionStage};
use crate::models::{QueryParam, QueryRequest, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Started,
    Committed,
    RolledBack,
}

/// An open transaction, handed to the caller's transaction logic.
///
/// Statements run strictly in the order they are issued; `&mut` access
/// rules out interleaving.
#[derive(Debug)]
pub struct Transaction<'l> {
    id: String,
    lease: &'l mut Lease,
    state: TransactionState,
    statements: u32,
}

impl<'l> Transaction<'l> {
    fn new(lease: &'l mut Lease) -> Self {
        Self {
            id: format!("tx_{}", Uuid::new_v4().simple()),
            lease,
            state: TransactionState::Started,
            statements: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Statements issued by the caller so far.
    pub fn statement_count(&self) -> u32 {
        self.statements
    }

    /// Run a statement inside the transaction.
    pub async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        if self.state != TransactionState::Started {
            return Err(DbError::invalid_input(format!(
                "transaction {} is no longer open",
                self.id
            )));
        }
        self.statements += 1;
        debug!(
            transaction_id = %self.id,
            statement = self.statements,
            sql = %sql,
            "Executing statement in transaction"
        );
        self.lease.query(sql, params).await
    }

    /// Run a prepared request inside the transaction.
    pub async fn run(&mut self, request: &QueryRequest) -> DbResult<QueryResult> {
        self.query(&request.sql, &request.params).await
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        Ok(self.query(sql, params).await?.rows_affected)
    }

    async fn begin(&mut self) -> DbResult<()> {
        // Marked before BEGIN goes out: a cancelled BEGIN must not return the connection
        self.lease.set_in_transaction(true);
        self.lease.query("BEGIN", &[]).await?;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.lease.query("COMMIT", &[]).await?;
        self.lease.set_in_transaction(false);
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Roll back. A failure is logged, never returned; the lease then stays
    /// marked and its connection is discarded when the lease drops.
    async fn rollback(&mut self) {
        match self.lease.query("ROLLBACK", &[]).await {
            Ok(_) => self.lease.set_in_transaction(false),
            Err(e) => error!(
                transaction_id = %self.id,
                lease_id = self.lease.id(),
                error = %e,
                "ROLLBACK failed, discarding connection"
            ),
        }
        self.state = TransactionState::RolledBack;
    }
}

/// Run `work` inside a transaction on a dedicated lease.
///
/// Acquisition failures are returned as they are; every failure after that
/// is rolled back and wrapped in [`DbError::Transaction`].
pub(crate) async fn run_transaction<T, E, F>(pool: &ConnectionPool, work: F) -> DbResult<T>
where
    F: for<'t> FnOnce(&'t mut Transaction<'_>) -> BoxFuture<'t, Result<T, E>>,
    E: Into<BoxError>,
{
    let mut lease = pool.acquire().await?;
    let tracker = pool.tracker().clone();
    let start = Instant::now();
    let lease_id = lease.id();
    let mut tx = Transaction::new(&mut lease);

    debug!(transaction_id = %tx.id, lease_id, "Beginning transaction");

    let failure: (TransactionStage, BoxError) = match tx.begin().await {
        Err(e) => (TransactionStage::Begin, e.into()),
        Ok(()) => match work(&mut tx).await {
            Err(e) => (TransactionStage::Work, e.into()),
            Ok(value) => match tx.commit().await {
                Err(e) => (TransactionStage::Commit, e.into()),
                Ok(()) => {
                    tracker.record_commit();
                    info!(
                        transaction_id = %tx.id,
                        statements = tx.statements,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Transaction committed"
                    );
                    return Ok(value);
                }
            },
        },
    };

    let (stage, cause) = failure;
    tx.rollback().await;
    tracker.record_rollback();
    warn!(
        transaction_id = %tx.id,
        stage = %stage,
        statements = tx.statements,
        duration_ms = start.elapsed().as_millis() as u64,
        error = %cause,
        "Transaction rolled back"
    );
    Err(DbError::transaction(tx.id.clone(), stage, cause))
}
