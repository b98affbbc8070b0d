//! Database access layer.
//!
//! This module provides database access functionality:
//! - Connection pool management with leased connections
//! - Retrying query execution
//! - Scoped transactions
//! - Row streaming
//! - Fault reporting for idle connections
//! - Type mappings

pub mod database;
pub mod executor;
pub mod fault;
pub mod lease;
pub mod params;
pub mod pool;
pub mod retry;
pub mod stream;
pub mod transaction;
pub mod types;

pub use crate::models::DatabaseType;
pub use database::Database;
pub use executor::QueryExecutor;
pub use fault::{FaultListener, FaultReporter, PoolFault};
pub use lease::Lease;
pub use pool::{ConnectionPool, DbPool, PoolStatus};
pub use retry::{RetryClassifier, RetryFailure, RetryPolicy};
pub use stream::{RowStream, StreamState};
pub use transaction::{Transaction, TransactionState};
