//! Configuration handling for the database access layer.
//!
//! Settings come from CLI flags with environment variable fallbacks. They are
//! resolved once, at startup, into an immutable [`PoolConfig`]; a missing
//! required setting is a fatal [`DbError::Configuration`].

use clap::{Args, ValueEnum};
use std::time::Duration;

use crate::db::retry::{RetryClassifier, RetryPolicy};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, masked_connection_string};

// Pool configuration defaults
pub const DEFAULT_MAX_POOL_SIZE: u32 = 10;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 2_000;

// Executor, stream and shutdown defaults
pub const DEFAULT_QUERY_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;
pub const DEFAULT_STREAM_BUFFER: usize = 100;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Deployment environment class. Decides the TLS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentClass {
    Development,
    Test,
    Production,
}

impl EnvironmentClass {
    /// TLS policy applied to PostgreSQL connections in this environment.
    pub fn tls_mode(&self) -> TlsMode {
        match self {
            Self::Production => TlsMode::RequiredUnverified,
            Self::Development | Self::Test => TlsMode::Disabled,
        }
    }
}

impl std::fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// TLS policy for PostgreSQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plain TCP.
    Disabled,
    /// TLS is required, the server certificate is not verified.
    RequiredUnverified,
}

/// Which failed attempts the executor retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RetryMode {
    /// Connection failures, timeouts, serialization failures and lock contention
    #[default]
    Transient,
    /// Every failure, including syntax and constraint errors
    Always,
    /// No retries
    Never,
}

impl RetryMode {
    pub fn classifier(&self) -> RetryClassifier {
        match self {
            Self::Transient => RetryClassifier::Transient,
            Self::Always => RetryClassifier::Always,
            Self::Never => RetryClassifier::Never,
        }
    }
}

/// Raw settings as given on the command line or in the environment.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Database connection string (postgres://... or sqlite:...)
    #[arg(long, value_name = "URL", env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Environment class (development, test, production)
    #[arg(long = "app-env", value_enum, env = "APP_ENV")]
    pub app_env: Option<EnvironmentClass>,

    /// Maximum number of pooled connections
    #[arg(long, env = "DB_MAX_POOL_SIZE")]
    pub max_pool_size: Option<u32>,

    /// Idle connection timeout in milliseconds (0 disables)
    #[arg(long, env = "DB_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: Option<u64>,

    /// Connection acquire timeout in milliseconds
    #[arg(long, env = "DB_CONNECTION_TIMEOUT_MS")]
    pub connection_timeout_ms: Option<u64>,

    /// Retries per query after the first attempt
    #[arg(long, env = "DB_QUERY_RETRIES")]
    pub query_retries: Option<u32>,

    /// Delay before the first retry in milliseconds; doubles on every retry
    #[arg(long, env = "DB_RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: Option<u64>,

    /// Which failures are retried
    #[arg(long, value_enum, env = "DB_RETRY_MODE")]
    pub retry_mode: Option<RetryMode>,

    /// Rows buffered ahead of a stream consumer
    #[arg(long, env = "DB_STREAM_BUFFER")]
    pub stream_buffer: Option<usize>,

    /// Time allowed for in-flight work to drain on close, in milliseconds
    #[arg(long, env = "DB_SHUTDOWN_TIMEOUT_MS")]
    pub shutdown_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a configuration pointing at `database_url` with every optional setting unset.
    pub fn for_url(database_url: impl Into<String>, app_env: EnvironmentClass) -> Self {
        Self {
            database_url: Some(database_url.into()),
            app_env: Some(app_env),
            ..Self::default()
        }
    }

    /// Get max_pool_size with default value.
    pub fn max_pool_size_or_default(&self) -> u32 {
        self.max_pool_size.unwrap_or(DEFAULT_MAX_POOL_SIZE)
    }

    /// Get idle_timeout_ms with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_ms.unwrap_or(DEFAULT_IDLE_TIMEOUT_MS)
    }

    /// Get connection_timeout_ms with default value.
    pub fn connection_timeout_or_default(&self) -> u64 {
        self.connection_timeout_ms
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_MS)
    }

    pub fn query_retries_or_default(&self) -> u32 {
        self.query_retries.unwrap_or(DEFAULT_QUERY_RETRIES)
    }

    pub fn retry_base_delay_or_default(&self) -> u64 {
        self.retry_base_delay_ms
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS)
    }

    pub fn stream_buffer_or_default(&self) -> usize {
        self.stream_buffer.unwrap_or(DEFAULT_STREAM_BUFFER)
    }

    pub fn shutdown_timeout_or_default(&self) -> u64 {
        self.shutdown_timeout_ms
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS)
    }

    /// Validate the settings and freeze them into a [`PoolConfig`].
    pub fn resolve(&self) -> DbResult<PoolConfig> {
        let connection_string = match self.database_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                return Err(DbError::configuration(
                    "DATABASE_URL is not set; a connection string is required",
                ));
            }
        };
        let environment = self.app_env.ok_or_else(|| {
            DbError::configuration(
                "APP_ENV is not set; expected one of development, test, production",
            )
        })?;
        let database_type =
            DatabaseType::from_connection_string(&connection_string).ok_or_else(|| {
                DbError::configuration(format!(
                    "Unsupported connection string '{}': expected postgres://, postgresql:// or sqlite:",
                    masked_connection_string(&connection_string)
                ))
            })?;

        let max_pool_size = self.max_pool_size_or_default();
        if max_pool_size == 0 {
            return Err(DbError::configuration(
                "DB_MAX_POOL_SIZE must be greater than 0",
            ));
        }
        let acquire_timeout_ms = self.connection_timeout_or_default();
        if acquire_timeout_ms == 0 {
            return Err(DbError::configuration(
                "DB_CONNECTION_TIMEOUT_MS must be greater than 0",
            ));
        }
        let stream_buffer = self.stream_buffer_or_default();
        if stream_buffer == 0 {
            return Err(DbError::configuration(
                "DB_STREAM_BUFFER must be greater than 0",
            ));
        }

        let idle_timeout = match self.idle_timeout_or_default() {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let query_retries = self.query_retries_or_default();
        let retry_base_delay_ms = self.retry_base_delay_or_default();
        if query_retries > 0 && retry_base_delay_ms == 0 {
            return Err(DbError::configuration(
                "DB_RETRY_BASE_DELAY_MS must be greater than 0 when retries are enabled",
            ));
        }

        let retry = RetryPolicy::new(query_retries, Duration::from_millis(retry_base_delay_ms))
        .with_classifier(self.retry_mode.unwrap_or_default().classifier());

        Ok(PoolConfig {
            connection_string,
            database_type,
            environment,
            max_pool_size,
            idle_timeout,
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
            tls: environment.tls_mode(),
            retry,
            stream_buffer,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_or_default()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            app_env: None,
            max_pool_size: None,
            idle_timeout_ms: None,
            connection_timeout_ms: None,
            query_retries: None,
            retry_base_delay_ms: None,
            retry_mode: None,
            stream_buffer: None,
            shutdown_timeout_ms: None,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Fully resolved pool configuration.
///
/// Built once by [`Config::resolve`]; the database facade keeps it behind an
/// `Arc` and never mutates it.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub connection_string: String,
    pub database_type: DatabaseType,
    pub environment: EnvironmentClass,
    pub max_pool_size: u32,
    /// `None` keeps idle connections open indefinitely.
    pub idle_timeout: Option<Duration>,
    pub acquire_timeout: Duration,
    pub tls: TlsMode,
    pub retry: RetryPolicy,
    pub stream_buffer: usize,
    pub shutdown_timeout: Duration,
}

impl PoolConfig {
    /// Connection string with the password masked, for logs.
    pub fn masked_connection_string(&self) -> String {
        masked_connection_string(&self.connection_string)
    }

    pub fn with_max_pool_size(mut self, max_pool_size: u32) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }
}
