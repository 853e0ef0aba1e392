//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres, schema bootstrap,
//! and the mapping from driver errors to storage errors used by the
//! Postgres-backed stores.

use crate::error::{ServiceError, ServiceResult};
use crate::pg_idempotency::PgIdempotencyStore;
use crate::pg_orders::PgOrderStore;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use upkeep_core::{StorageError, UpkeepError};

/// Schema applied by [`DbClient::migrate`].
pub const BOOTSTRAP_SQL: &str = include_str!("../sql/001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Time to wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "upkeep".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("UPKEEP_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("UPKEEP_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("UPKEEP_DB_NAME").unwrap_or_else(|_| "upkeep".to_string()),
            user: std::env::var("UPKEEP_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("UPKEEP_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("UPKEEP_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("UPKEEP_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ServiceResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ServiceError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Wraps the connection pool and hands out the Postgres-backed stores.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ServiceResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get the number of idle connections in the pool.
    pub fn pool_available(&self) -> usize {
        self.pool.status().available
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Apply the bootstrap schema. Safe to run on every startup.
    pub async fn migrate(&self) -> ServiceResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(BOOTSTRAP_SQL).await?;
        tracing::info!("Database schema applied");
        Ok(())
    }

    pub fn idempotency_store(&self) -> PgIdempotencyStore {
        PgIdempotencyStore::new(self.pool.clone())
    }

    pub fn order_store(&self) -> PgOrderStore {
        PgOrderStore::new(self.pool.clone())
    }
}

// ============================================================================
// DRIVER ERROR MAPPING
// ============================================================================

pub(crate) fn pool_error(err: PoolError) -> UpkeepError {
    StorageError::Unavailable {
        reason: err.to_string(),
    }
    .into()
}

pub(crate) fn query_error(table: &'static str, err: tokio_postgres::Error) -> UpkeepError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let key = err
            .as_db_error()
            .and_then(|db| db.constraint())
            .unwrap_or("unique key")
            .to_string();
        return StorageError::UniqueViolation { table, key }.into();
    }
    if err.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
        let key = err
            .as_db_error()
            .and_then(|db| db.constraint())
            .unwrap_or("foreign key")
            .to_string();
        return StorageError::ForeignKeyViolation { table, key }.into();
    }
    if err.is_closed() {
        return StorageError::Unavailable {
            reason: err.to_string(),
        }
        .into();
    }
    StorageError::QueryFailed {
        table,
        reason: err.to_string(),
    }
    .into()
}

pub(crate) fn corrupt_row(table: &'static str, reason: impl ToString) -> UpkeepError {
    StorageError::CorruptRow {
        table,
        reason: reason.to_string(),
    }
    .into()
}
