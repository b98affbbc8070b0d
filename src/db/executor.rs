//! Query execution engine.
//!
//! This module provides query execution functionality with support for:
//! - Parameterized queries
//! - Bounded retry with exponential backoff
//! - Structured logging of outcome and timing
//!
//! # Architecture
//!
//! The executor uses backend-specific implementations organized in submodules:
//! - `postgres`: PostgreSQL-specific statement execution
//! - `sqlite`: SQLite-specific statement execution
//!
//! Each submodule provides identical functionality adapted to the backend's type system.
//! Every attempt runs on its own lease, which is returned to the pool before
//! the backoff sleep so a waiting caller can use it.

use crate::db::lease::LeasedConnection;
use crate::db::pool::ConnectionPool;
use crate::db::retry::{RetryFailure, RetryPolicy};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryRequest, QueryResult};
use futures_util::TryStreamExt;
use sqlx::Either;
use std::time::Instant;
use tracing::{debug, error, info};

/// Query executor that runs single statements against the pool.
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    retry: RetryPolicy,
}

impl QueryExecutor {
    /// Create a new query executor with the given retry policy.
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute one statement, retrying failed attempts as the policy allows.
    ///
    /// When every attempt fails, the last error is returned wrapped in
    /// [`DbError::Query`] together with the SQL text and parameters.
    pub async fn execute(
        &self,
        pool: &ConnectionPool,
        request: &QueryRequest,
    ) -> DbResult<QueryResult> {
        let start = Instant::now();

        debug!(
            sql = %request.sql,
            params = request.params.len(),
            "Executing query"
        );

        let outcome = self
            .retry
            .run(|attempt| async move {
                let mut lease = pool.acquire().await?;
                let lease_id = lease.id();
                let result =
                    run_statement(lease.connection()?, &request.sql, &request.params).await;
                drop(lease);
                if let Err(e) = &result {
                    debug!(attempt, lease_id, error = %e, "Statement failed");
                }
                result
            })
            .await;

        match outcome {
            Ok((result, attempts)) => {
                info!(
                    sql = %request.sql,
                    duration_ms = start.elapsed().as_millis() as u64,
                    row_count = result.row_count,
                    attempts,
                    "Executed query"
                );
                Ok(result)
            }
            Err(RetryFailure { error, attempts }) => {
                error!(
                    sql = %request.sql,
                    params = ?request.params,
                    code = ?error.code(),
                    attempts,
                    duration_ms = start.elapsed().as_millis() as u64,
                    error = %error,
                    "Query failed"
                );
                Err(DbError::query(
                    request.sql.clone(),
                    request.params.clone(),
                    attempts,
                    error,
                ))
            }
        }
    }
}

/// Run one statement on a leased connection, without retry.
pub(crate) async fn run_statement(
    conn: &mut LeasedConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<QueryResult> {
    let start = Instant::now();
    match conn {
        LeasedConnection::Postgres(c) => {
            let (rows, rows_affected) = postgres::fetch_all(&mut **c, sql, params).await?;
            process_rows(rows, rows_affected, start)
        }
        LeasedConnection::SQLite(c) => {
            let (rows, rows_affected) = sqlite::fetch_all(&mut **c, sql, params).await?;
            process_rows(rows, rows_affected, start)
        }
    }
}

/// Process rows from any backend into a QueryResult.
fn process_rows<R: RowToJson>(
    rows: Vec<R>,
    rows_affected: u64,
    start: Instant,
) -> DbResult<QueryResult> {
    let columns = rows
        .first()
        .map(RowToJson::get_column_metadata)
        .unwrap_or_default();
    let json_rows = rows
        .iter()
        .map(RowToJson::to_json_map)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::new(
        columns,
        json_rows,
        rows_affected,
        start.elapsed().as_millis() as u64,
    ))
}

// =============================================================================
// Backend-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its backend.
// The code structure is intentionally parallel to make differences obvious.

mod postgres {
    use super::*;
    use crate::db::params::postgres_query;
    use sqlx::Executor;
    use sqlx::postgres::{PgConnection, PgRow};

    pub async fn fetch_all(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<(Vec<PgRow>, u64)> {
        // When params is empty, use raw SQL to avoid prepared statement issues
        let mut stream = if params.is_empty() {
            conn.fetch_many(sql)
        } else {
            conn.fetch_many(postgres_query(sql, params))
        };

        let mut rows = Vec::new();
        let mut rows_affected = 0;
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => rows.push(row),
            }
        }
        Ok((rows, rows_affected))
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::sqlite_query;
    use sqlx::Executor;
    use sqlx::sqlite::{SqliteConnection, SqliteRow};

    pub async fn fetch_all(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<(Vec<SqliteRow>, u64)> {
        let mut stream = if params.is_empty() {
            conn.fetch_many(sql)
        } else {
            conn.fetch_many(sqlite_query(sql, params))
        };

        let mut rows = Vec::new();
        let mut rows_affected = 0;
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => rows.push(row),
            }
        }
        Ok((rows, rows_affected))
    }
}
