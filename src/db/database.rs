//! The database handle callers hold.
//!
//! [`Database`] ties the pool, the executor, the transaction coordinator, the
//! stream path and the fault channel together behind one cheaply clonable
//! handle. There is no global instance: the host builds one from a resolved
//! [`PoolConfig`], passes it to whoever needs it, and closes it at the end.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::PoolConfig;
use crate::db::executor::QueryExecutor;
use crate::db::fault::{FaultListener, FaultReporter};
use crate::db::lease::Lease;
use crate::db::pool::{ConnectionPool, PoolStatus};
use crate::db::stream::{RowStream, open_stream};
use crate::db::transaction::{Transaction, run_transaction};
use crate::error::{BoxError, DbResult};
use crate::models::{QueryParam, QueryRequest, QueryResult};

#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    pool: ConnectionPool,
    executor: QueryExecutor,
    faults: FaultReporter,
}

impl Database {
    /// Build the pool. No connection is opened until the first acquire.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig) -> DbResult<Self> {
        let config = Arc::new(config);
        let faults = FaultReporter::new();
        let pool = ConnectionPool::new(Arc::clone(&config), faults.clone())?;
        let executor = QueryExecutor::new(config.retry.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                executor,
                faults,
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        self.inner.pool.config()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Lease a connection directly.
    pub async fn acquire(&self) -> DbResult<Lease> {
        self.inner.pool.acquire().await
    }

    /// Run one statement with retry.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        let request = QueryRequest::new(sql).with_params(params.to_vec());
        self.execute(&request).await
    }

    /// Run a prepared request with retry.
    pub async fn execute(&self, request: &QueryRequest) -> DbResult<QueryResult> {
        self.inner.executor.execute(&self.inner.pool, request).await
    }

    /// Run `work` inside a transaction and return its value once committed.
    ///
    /// ```ignore
    /// let id = db
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute("INSERT INTO attempts (user_id) VALUES ($1)", &[user_id.into()])
    ///                 .await?;
    ///             let row = tx.query("SELECT lastval() AS id", &[]).await?;
    ///             Ok::<_, DbError>(row.rows[0]["id"].clone())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, E, F>(&self, work: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'_>) -> BoxFuture<'t, Result<T, E>>,
        E: Into<BoxError>,
    {
        run_transaction(&self.inner.pool, work).await
    }

    /// Open a row stream on a dedicated connection.
    pub async fn stream(&self, sql: &str, params: &[QueryParam]) -> DbResult<RowStream> {
        open_stream(&self.inner.pool, sql.to_string(), params.to_vec()).await
    }

    /// Drain and close the pool. Idempotent.
    pub async fn close(&self) {
        self.inner.pool.shutdown().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    pub fn status(&self) -> PoolStatus {
        self.inner.pool.status()
    }

    /// Subscribe to idle-connection faults.
    pub fn faults(&self) -> FaultListener {
        self.inner.faults.subscribe()
    }

    pub fn fault_reporter(&self) -> &FaultReporter {
        &self.inner.faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EnvironmentClass};
    use crate::error::DbError;

    #[tokio::test]
    async fn test_database_is_clonable_and_shares_pool() {
        let config = Config::for_url("sqlite::memory:", EnvironmentClass::Test)
            .resolve()
            .unwrap()
            .with_max_pool_size(1);
        let db = Database::new(config).unwrap();
        let other = db.clone();

        let result = other.query("SELECT 1 AS one", &[]).await.unwrap();
        assert_eq!(result.rows[0]["one"], serde_json::json!(1));
        assert_eq!(db.status().total_acquired, 1);

        db.close().await;
        assert!(other.is_closed());
        let err = other.query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Query { ref source, .. } if matches!(**source, DbError::PoolClosed)
        ));
    }
}
