//! Process lifecycle: termination signals, pool faults and graceful close.

use std::future::Future;

use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

use crate::db::{Database, PoolFault};

/// Why a supervised future was cut short.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShutdownReason {
    #[error("interrupted by {0}")]
    Signal(&'static str),
    #[error("pool fault: {0}")]
    Fault(PoolFault),
}

impl ShutdownReason {
    /// Conventional process exit status for this reason.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Signal(_) => 130,
            Self::Fault(_) => 2,
        }
    }
}

/// Runs work under supervision and closes the pool however it ends.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    db: Database,
    listen_for_signals: bool,
}

impl ShutdownController {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            listen_for_signals: true,
        }
    }

    /// Only react to pool faults, not to process signals.
    pub fn without_signals(mut self) -> Self {
        self.listen_for_signals = false;
        self
    }

    /// Run `work` until it completes, a termination signal arrives, or the
    /// pool reports a fault. The pool is closed before this returns.
    pub async fn run<F: Future>(self, work: F) -> Result<F::Output, ShutdownReason> {
        let mut faults = self.db.faults();
        let listen_for_signals = self.listen_for_signals;
        let signal = async move {
            if listen_for_signals {
                wait_for_signal().await
            } else {
                std::future::pending().await
            }
        };

        let outcome = tokio::select! {
            output = work => Ok(output),
            name = signal => {
                info!(signal = name, "Shutdown signal received");
                Err(ShutdownReason::Signal(name))
            }
            Some(fault) = faults.recv() => {
                error!(fault = %fault, "Pool fault, shutting down");
                Err(ShutdownReason::Fault(fault))
            }
        };

        self.db.close().await;
        outcome
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) and return its name.
///
/// If a handler cannot be installed, a warning is logged and that signal is
/// never reported.
pub async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
