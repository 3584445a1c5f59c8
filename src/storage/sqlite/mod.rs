//! SQLite implementations of storage interfaces.
//!
//! One `SqliteStore` owns the pool and implements every storage trait, so
//! writes spanning tables (node plus slot pointer, reward release plus
//! payout) share one transaction.

mod commission_ledger;
mod directory;
mod reward_store;
mod tree_store;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::schema::{CREATE_DIRECTORY_TABLES, CREATE_LEDGER_TABLES, CREATE_TREE_TABLES};
use super::{Result, StorageError};
use crate::config::SqliteConfig;

/// In-memory database path accepted by [`SqliteStore::connect`].
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite implementation of every storage trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database described by `config`.
    pub async fn connect(config: &SqliteConfig) -> Result<Self> {
        let (options, max_connections) = if config.path == MEMORY_PATH {
            // Every connection to :memory: is its own database.
            (SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
        } else {
            if let Some(parent) = Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            }
            (
                SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(true),
                config.max_connections,
            )
        };

        let options = options.busy_timeout(Duration::from_millis(config.busy_timeout_ms));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_DIRECTORY_TABLES).execute(&self.pool).await?;
        sqlx::query(CREATE_TREE_TABLES).execute(&self.pool).await?;
        sqlx::query(CREATE_LEDGER_TABLES).execute(&self.pool).await?;
        debug!("SQLite schema initialized");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Takes the write lock at BEGIN so concurrent writers never upgrade mid-transaction.
async fn begin_immediate(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(())
}

async fn begin_read(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("BEGIN").execute(&mut *conn).await?;
    Ok(())
}

async fn finish<T>(conn: &mut SqliteConnection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(value)
        }
        Err(e) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(e)
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_id<T: From<Uuid>>(value: &str) -> Result<T> {
    Ok(T::from(Uuid::parse_str(value)?))
}

fn parse_opt_id<T: From<Uuid>>(value: Option<String>) -> Result<Option<T>> {
    value.as_deref().map(parse_id).transpose()
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    Ok(Decimal::from_str(value)?)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{value}: {e}")))
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("{column} out of range: {value}")))
}
