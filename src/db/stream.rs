//! Streaming query path.
//!
//! A stream owns one lease for its whole life. A background task drives the
//! driver's incremental row fetch and forwards decoded rows through a bounded
//! channel, so a slow consumer holds back the fetch. The task gives the lease
//! back when the rows run out, when the statement fails, or when the consumer
//! drops the [`RowStream`].

use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Instant;

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt, future};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::db::lease::{Lease, LeasedConnection};
use crate::db::pool::ConnectionPool;
use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::models::{QueryParam, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Ended,
    Errored,
}

/// Forward-only, non-restartable sequence of rows.
///
/// Yields `Ok(row)` for each row in source order and ends after the last one.
/// A failure is yielded once as `Err` and ends the stream.
#[derive(Debug)]
pub struct RowStream {
    id: u64,
    rx: mpsc::Receiver<DbResult<Row>>,
    state: StreamState,
    rows_received: u64,
}

impl RowStream {
    /// Id of the lease backing this stream.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn rows_received(&self) -> u64 {
        self.rows_received
    }
}

impl Stream for RowStream {
    type Item = DbResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state != StreamState::Open {
            return Poll::Ready(None);
        }
        match ready!(self.rx.poll_recv(cx)) {
            Some(Ok(row)) => {
                self.rows_received += 1;
                Poll::Ready(Some(Ok(row)))
            }
            Some(Err(e)) => {
                self.state = StreamState::Errored;
                self.rx.close();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                self.state = StreamState::Ended;
                Poll::Ready(None)
            }
        }
    }
}

/// Lease a connection and start streaming `sql`.
///
/// Acquisition happens before this returns, so pool errors surface here
/// rather than as the first stream item.
pub(crate) async fn open_stream(
    pool: &ConnectionPool,
    sql: String,
    params: Vec<QueryParam>,
) -> DbResult<RowStream> {
    let lease = pool.acquire().await?;
    let id = lease.id();
    let (tx, rx) = mpsc::channel(pool.config().stream_buffer);

    debug!(stream_id = id, sql = %sql, params = params.len(), "Opening row stream");
    tokio::spawn(drive(lease, sql, params, tx));

    Ok(RowStream {
        id,
        rx,
        state: StreamState::Open,
        rows_received: 0,
    })
}

enum Outcome {
    Completed(u64),
    Abandoned(u64),
    Failed(u64),
}

async fn drive(
    mut lease: Lease,
    sql: String,
    params: Vec<QueryParam>,
    tx: mpsc::Sender<DbResult<Row>>,
) {
    let start = Instant::now();
    let stream_id = lease.id();

    let outcome = match lease.connection() {
        Ok(LeasedConnection::Postgres(conn)) => {
            forward(postgres::fetch(&mut **conn, &sql, &params), &tx).await
        }
        Ok(LeasedConnection::SQLite(conn)) => {
            forward(sqlite::fetch(&mut **conn, &sql, &params), &tx).await
        }
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            Outcome::Failed(0)
        }
    };
    drop(lease);

    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Outcome::Completed(rows) => {
            info!(stream_id, sql = %sql, rows, duration_ms, "Stream completed")
        }
        Outcome::Abandoned(rows) => {
            debug!(stream_id, rows, duration_ms, "Stream abandoned by consumer")
        }
        Outcome::Failed(rows) => {
            error!(stream_id, sql = %sql, rows, duration_ms, "Stream failed")
        }
    }
}

async fn forward(
    mut rows: BoxStream<'_, Result<Row, sqlx::Error>>,
    tx: &mpsc::Sender<DbResult<Row>>,
) -> Outcome {
    let mut sent = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => return Outcome::Abandoned(sent),
            next = rows.try_next() => next,
        };
        match next {
            Ok(Some(row)) => {
                if tx.send(Ok(row)).await.is_err() {
                    return Outcome::Abandoned(sent);
                }
                sent += 1;
            }
            Ok(None) => return Outcome::Completed(sent),
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                return Outcome::Failed(sent);
            }
        }
    }
}

mod postgres {
    use super::*;
    use crate::db::params::postgres_query;
    use sqlx::Executor;
    use sqlx::postgres::PgConnection;

    pub fn fetch<'c>(
        conn: &'c mut PgConnection,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> BoxStream<'c, Result<Row, sqlx::Error>> {
        let rows = if params.is_empty() {
            conn.fetch(sql)
        } else {
            conn.fetch(postgres_query(sql, params))
        };
        rows.and_then(|row| future::ready(row.to_json_map()))
            .boxed()
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::sqlite_query;
    use sqlx::Executor;
    use sqlx::sqlite::SqliteConnection;

    pub fn fetch<'c>(
        conn: &'c mut SqliteConnection,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> BoxStream<'c, Result<Row, sqlx::Error>> {
        let rows = if params.is_empty() {
            conn.fetch(sql)
        } else {
            conn.fetch(sqlite_query(sql, params))
        };
        rows.and_then(|row| future::ready(row.to_json_map()))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EnvironmentClass};
    use crate::db::fault::FaultReporter;
    use std::sync::Arc;

    fn memory_pool() -> ConnectionPool {
        let config = Config::for_url("sqlite::memory:", EnvironmentClass::Test)
            .resolve()
            .unwrap()
            .with_max_pool_size(1)
            .with_stream_buffer(2);
        ConnectionPool::new(Arc::new(config), FaultReporter::new()).unwrap()
    }

    const COUNT_TO_FIVE: &str = "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 5) SELECT n FROM seq";

    #[tokio::test]
    async fn test_stream_yields_rows_in_order() {
        let pool = memory_pool();
        let mut stream = open_stream(&pool, COUNT_TO_FIVE.to_string(), Vec::new())
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(row) = stream.next().await {
            seen.push(row.unwrap()["n"].as_i64().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(stream.state(), StreamState::Ended);
        assert_eq!(stream.rows_received(), 5);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_error_ends_stream() {
        let pool = memory_pool();
        let mut stream = open_stream(&pool, "SELECT * FROM no_such_table".to_string(), Vec::new())
            .await
            .unwrap();

        assert!(matches!(stream.next().await, Some(Err(_))));
        assert_eq!(stream.state(), StreamState::Errored);
        assert!(stream.next().await.is_none());
    }
}
