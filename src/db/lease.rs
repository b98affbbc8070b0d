//! Leased connections.
//!
//! A [`Lease`] is exclusive ownership of one pooled connection. It goes back
//! to the pool when dropped, so every exit path of the code holding it
//! releases it exactly once. A lease dropped while a transaction is still
//! open on it is detached from the pool and closed instead, so no other caller
//! can inherit the open transaction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Sqlite};
use tracing::{debug, warn};

use crate::db::executor::run_statement;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, QueryResult};

/// Backend connection held by a lease.
#[derive(Debug)]
pub(crate) enum LeasedConnection {
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl LeasedConnection {
    pub(crate) fn db_type(&self) -> DatabaseType {
        match self {
            Self::Postgres(_) => DatabaseType::PostgreSQL,
            Self::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Take the connection out of the pool; it closes when dropped.
    fn detach(self) {
        match self {
            Self::Postgres(conn) => drop(conn.detach()),
            Self::SQLite(conn) => drop(conn.detach()),
        }
    }
}

/// Counters shared by the pool and every lease it hands out.
#[derive(Debug, Default)]
pub(crate) struct LeaseTracker {
    next_id: AtomicU64,
    leased: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    faults: AtomicU64,
}

impl LeaseTracker {
    /// Register a new lease and return its id.
    fn on_acquire(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.acquired.fetch_add(1, Ordering::Relaxed);
        let now = self.leased.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        id
    }

    fn on_release(&self, discarded: bool) {
        self.leased.fetch_sub(1, Ordering::AcqRel);
        self.released.fetch_add(1, Ordering::Relaxed);
        if discarded {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn counters(&self) -> LeaseCounters {
        LeaseCounters {
            leased: self.leased.load(Ordering::Acquire),
            peak_leased: self.peak.load(Ordering::Acquire),
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the tracker counters.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LeaseCounters {
    pub leased: usize,
    pub peak_leased: usize,
    pub total_acquired: u64,
    pub total_released: u64,
    pub discarded: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub faults: u64,
}

/// Exclusive handle on one pooled connection.
#[derive(Debug)]
pub struct Lease {
    id: u64,
    conn: Option<LeasedConnection>,
    tracker: Arc<LeaseTracker>,
    acquired_at: Instant,
    in_transaction: bool,
}

impl Lease {
    pub(crate) fn new(conn: LeasedConnection, tracker: Arc<LeaseTracker>) -> Self {
        let id = tracker.on_acquire();
        debug!(lease_id = id, "Connection leased");
        Self {
            id,
            conn: Some(conn),
            tracker,
            acquired_at: Instant::now(),
            in_transaction: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Time since the connection was handed out.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn db_type(&self) -> Option<DatabaseType> {
        self.conn.as_ref().map(LeasedConnection::db_type)
    }

    /// Whether a transaction is open on this connection.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub(crate) fn set_in_transaction(&mut self, open: bool) {
        self.in_transaction = open;
    }

    pub(crate) fn connection(&mut self) -> DbResult<&mut LeasedConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::internal("lease has no connection"))
    }

    /// Run one statement on the leased connection. Never retried.
    pub async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        run_statement(self.connection()?, sql, params).await
    }

    /// Return the connection to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let held_ms = self.acquired_at.elapsed().as_millis() as u64;
        if self.in_transaction {
            warn!(
                lease_id = self.id,
                held_ms, "Lease dropped inside an open transaction, discarding its connection"
            );
            conn.detach();
            self.tracker.on_release(true);
        } else {
            drop(conn);
            self.tracker.on_release(false);
            debug!(lease_id = self.id, held_ms, "Connection released");
        }
    }
}
