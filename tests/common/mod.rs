//! Shared setup for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use exam_db::config::{Config, EnvironmentClass, PoolConfig};
use exam_db::Database;
use tempfile::NamedTempFile;

/// URL of a fresh SQLite database file that outlives the test.
pub fn temp_sqlite_url() -> String {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    format!("sqlite:{}?mode=rwc", db_path)
}

/// Resolved settings for a fresh SQLite file, with short timeouts.
pub fn sqlite_config() -> PoolConfig {
    Config::for_url(temp_sqlite_url(), EnvironmentClass::Test)
        .resolve()
        .unwrap()
        .with_acquire_timeout(Duration::from_secs(5))
        .with_shutdown_timeout(Duration::from_secs(2))
}

/// A database handle over a fresh SQLite file.
pub fn sqlite_db(configure: impl FnOnce(PoolConfig) -> PoolConfig) -> Database {
    Database::new(configure(sqlite_config())).unwrap()
}
