//! Fault channel between the pool and its host.
//!
//! An error on an idle pooled connection means the pool can no longer vouch
//! for its connections. The pool never terminates the process itself: it
//! reports a [`PoolFault`] through a [`FaultReporter`], and whoever holds a
//! [`FaultListener`] (usually the shutdown controller) decides what to do.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::error;

use crate::error::DbError;

/// A fatal error observed on an idle pooled connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolFault {
    pub message: String,
    /// How long the failing connection had been idle before the error surfaced.
    pub idle_for: Duration,
    pub occurred_at: DateTime<Utc>,
}

impl PoolFault {
    pub fn new(message: impl Into<String>, idle_for: Duration) -> Self {
        Self {
            message: message.into(),
            idle_for,
            occurred_at: Utc::now(),
        }
    }

    pub fn into_error(self) -> DbError {
        DbError::pool_fatal(format!(
            "idle connection failed after {}ms: {}",
            self.idle_for.as_millis(),
            self.message
        ))
    }
}

impl std::fmt::Display for PoolFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at {})", self.message, self.occurred_at.to_rfc3339())
    }
}

/// Sending half of the fault channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    tx: Arc<watch::Sender<Option<PoolFault>>>,
}

impl FaultReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Publish a fault. The latest fault replaces any earlier one.
    pub fn report(&self, fault: PoolFault) {
        error!(
            message = %fault.message,
            idle_ms = fault.idle_for.as_millis() as u64,
            "Unexpected error on idle pooled connection"
        );
        self.tx.send_replace(Some(fault));
    }

    /// The most recently reported fault, if any.
    pub fn last(&self) -> Option<PoolFault> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> FaultListener {
        FaultListener {
            rx: self.tx.subscribe(),
            primed: false,
        }
    }
}

impl Default for FaultReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of the fault channel.
#[derive(Debug)]
pub struct FaultListener {
    rx: watch::Receiver<Option<PoolFault>>,
    primed: bool,
}

impl FaultListener {
    /// Wait for the next fault.
    ///
    /// The first call returns a fault that was reported before the listener
    /// existed. Returns `None` once every reporter is gone.
    pub async fn recv(&mut self) -> Option<PoolFault> {
        if !self.primed {
            self.primed = true;
            let current = self.rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
        }
        loop {
            self.rx.changed().await.ok()?;
            let current = self.rx.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
        }
    }
}
