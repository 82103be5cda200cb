//! # Connection Pool
//!
//! Opens the SQLite pool every repository shares.
//!
//! ```text
//!   DbConfig::new(path) | DbConfig::from_env() | DbConfig::in_memory()
//!        │
//!        ▼
//!   Database::new(config) ── WAL, synchronous=NORMAL, foreign_keys=ON
//!        │
//!        ├── db.pool()                      raw sqlx access (DDL, fixtures)
//!        └── db.repository::<M, E>()        Repository over a pool clone
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::Repository;
use crate::schema::{Table, TableSchema};
use strata_core::Model;

/// Environment variable holding the database file path.
pub const ENV_DATABASE_PATH: &str = "STRATA_DATABASE_PATH";

/// Environment variable holding the pool size.
pub const ENV_MAX_CONNECTIONS: &str = "STRATA_MAX_CONNECTIONS";

/// Environment variable holding the acquire timeout, in whole seconds.
pub const ENV_ACQUIRE_TIMEOUT_SECS: &str = "STRATA_ACQUIRE_TIMEOUT_SECS";

// =============================================================================
// Configuration
// =============================================================================

/// Where the database lives and how many connections may reach it.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Default 5.
    pub max_connections: u32,
    /// How long a repository call waits for a free connection. Default 30s.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// File-backed configuration; the file is created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Reads `STRATA_DATABASE_PATH` (default `./strata.db`),
    /// `STRATA_MAX_CONNECTIONS` and `STRATA_ACQUIRE_TIMEOUT_SECS`.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let path = env::var(ENV_DATABASE_PATH).unwrap_or_else(|_| "./strata.db".to_string());
        let mut config = DbConfig::new(path);

        if let Ok(raw) = env::var(ENV_MAX_CONNECTIONS) {
            match raw.parse::<u32>() {
                Ok(max) if max > 0 => config.max_connections = max,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_MAX_CONNECTIONS),
            }
        }

        if let Ok(raw) = env::var(ENV_ACQUIRE_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) => config.acquire_timeout = Duration::from_secs(secs),
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_ACQUIRE_TIMEOUT_SECS),
            }
        }

        config
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// A private in-memory database. Each SQLite connection would get its
    /// own empty database, so the pool is pinned to one connection.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle: owns the pool and hands out repositories.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects the pool. Creating tables is left to the caller.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening database");

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        debug!(
            max_connections = config.max_connections,
            acquire_timeout = ?config.acquire_timeout,
            "Connecting pool"
        );

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            // The database dies with its last connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        Ok(Database { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Database { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns a repository for the `M` / `E` pairing.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let users = db.repository::<UserRecord, User>();
    /// let ada = users.find_by_id(1).await?;
    /// ```
    pub fn repository<M, E>(&self) -> Repository<M, E, TableSchema>
    where
        M: Table + Model<E>,
    {
        Repository::new(self.pool.clone())
    }

    /// Closes the pool; repository calls made afterwards fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// `SELECT 1` round trip.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
