//! Exam DB - operator entry point.
//!
//! Runs one command against the configured database: a connectivity check, a
//! single retried query, or a row stream.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use exam_db::config::Config;
use exam_db::error::BoxError;
use exam_db::{Database, DbError, QueryParam, ShutdownController};
use futures_util::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "exam-db", version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify the database is reachable
    Check,
    /// Run one statement and print the result as JSON
    Query {
        sql: String,
        /// Positional parameter as a JSON literal (repeatable)
        #[arg(long = "param", value_name = "JSON", value_parser = parse_param)]
        params: Vec<QueryParam>,
    },
    /// Stream rows, one JSON object per line
    Stream {
        sql: String,
        /// Positional parameter as a JSON literal (repeatable)
        #[arg(long = "param", value_name = "JSON", value_parser = parse_param)]
        params: Vec<QueryParam>,
    },
}

fn parse_param(raw: &str) -> Result<QueryParam, String> {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(QueryParam::from)
        .map_err(|e| format!("not a JSON literal: {e}"))
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

async fn run(db: &Database, command: Command) -> Result<(), BoxError> {
    let mut out = io::stdout();
    match command {
        Command::Check => {
            let start = Instant::now();
            db.query("SELECT 1", &[]).await?;
            info!(
                duration_ms = start.elapsed().as_millis() as u64,
                "Database is reachable"
            );
        }
        Command::Query { sql, params } => {
            let result = db.query(&sql, &params).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
        }
        Command::Stream { sql, params } => {
            let mut rows = db.stream(&sql, &params).await?;
            while let Some(row) = rows.next().await {
                writeln!(out, "{}", serde_json::to_string(&row?)?)?;
            }
            info!(
                stream_id = rows.id(),
                rows = rows.rows_received(),
                "Stream finished"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(&cli.config);

    let config = match cli.config.resolve() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(1);
        }
    };

    info!(
        database = %config.masked_connection_string(),
        db_type = %config.database_type,
        environment = %config.environment,
        max_pool_size = config.max_pool_size,
        "Starting exam-db v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = match Database::new(config) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to create connection pool");
            return ExitCode::from(1);
        }
    };

    let controller = ShutdownController::new(db.clone());
    match controller.run(run(&db, cli.command)).await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            let suggestion = e.downcast_ref::<DbError>().and_then(DbError::suggestion);
            error!(error = %e, suggestion, "Command failed");
            ExitCode::from(1)
        }
        Err(reason) => {
            warn!(reason = %reason, "Shut down before the command finished");
            ExitCode::from(reason.exit_code())
        }
    }
}
