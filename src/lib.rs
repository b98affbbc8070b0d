//! Exam DB
//!
//! Database access layer for the exam platform: a bounded connection pool
//! with leased connections, retried queries, scoped transactions, row
//! streaming and graceful shutdown, over PostgreSQL and SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod shutdown;

pub use config::{Config, EnvironmentClass, PoolConfig};
pub use db::Database;
pub use error::{DbError, DbResult};
pub use models::{QueryParam, QueryResult, Row};
pub use shutdown::{ShutdownController, ShutdownReason};
