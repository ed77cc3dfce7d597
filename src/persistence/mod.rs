//! Persistence Layer
//!
//! Local SQLite store for the worker's own state. The snapshot itself lives
//! in the REST backend; this database only remembers scheduling state and a
//! summary of each cycle so a restart does not reseed a baseline twice in
//! the same week.
//!
//! # Database Schema
//!
//! ## scheduler_state
//! - id: always 1
//! - last_baseline: Timestamp of the last successful weekly baseline
//! - updated_at: Timestamp
//!
//! ## cycle_runs
//! - id: Serial
//! - trigger_kind: "startup", "baseline", "refresh" or "manual"
//! - started_at / finished_at: Timestamps
//! - loaded, published, retracted, untouched, skipped_invalid_id,
//!   status_missing, write_errors: Counters
//! - error: Optional abort reason

pub mod models;
pub mod state_repository;

pub use state_repository::{SqliteStateStore, WorkerStateStore};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Open the state database and bring its schema up to date
///
/// # Arguments
/// - `config`: URL (e.g. "sqlite://data/worker_state.db" or "sqlite::memory:")
///   and pool size
pub async fn init_database(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    let database_url = config.url.as_str();
    info!("Initializing state database: {}", database_url);

    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    if !config.log_queries {
        options = options.disable_statement_logging();
    }

    // An in-memory database exists per connection, so it must stay on one
    let in_memory = database_url.contains(":memory:");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
    };

    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("✓ State database ready");

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running state database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduler_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_baseline DATETIME,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create scheduler_state table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cycle_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trigger_kind TEXT NOT NULL,
            started_at DATETIME NOT NULL,
            finished_at DATETIME NOT NULL,
            loaded INTEGER NOT NULL DEFAULT 0,
            published INTEGER NOT NULL DEFAULT 0,
            retracted INTEGER NOT NULL DEFAULT 0,
            untouched INTEGER NOT NULL DEFAULT 0,
            skipped_invalid_id INTEGER NOT NULL DEFAULT 0,
            status_missing INTEGER NOT NULL DEFAULT 0,
            write_errors INTEGER NOT NULL DEFAULT 0,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create cycle_runs table: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cycle_runs_started_at ON cycle_runs(started_at)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ State database migrations completed");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/worker_state.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Log statements at debug level
    pub log_queries: bool,

    /// Days of cycle run summaries to keep; 0 keeps all
    pub cycle_retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/worker_state.db".to_string(),
            max_connections: 2,
            log_queries: cfg!(debug_assertions),
            cycle_retention_days: 30,
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("STATE_DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.url);

        let max_connections = std::env::var("STATE_DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("STATE_DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        let cycle_retention_days = std::env::var("STATE_CYCLE_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.cycle_retention_days);

        Self {
            url,
            max_connections,
            log_queries,
            cycle_retention_days,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            log_queries: false,
            cycle_retention_days: 30,
        }
    }
}
