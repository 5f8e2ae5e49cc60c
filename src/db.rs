//! Database connection and schema management.
//!
//! This module provides SQLite connectivity for the mirror catalog with:
//! - Connection pool management
//! - WAL mode for concurrent reads across crawl workers
//! - Automatic migration execution

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// Default maximum number of connections in the pool.
/// Kept low for SQLite since it uses file-level locking.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in milliseconds.
/// Connections will wait this long before returning SQLITE_BUSY.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Catalog database handle with connection pool.
///
/// Handles SQLite connection pooling, WAL mode configuration,
/// and automatic migration execution. Each crawl worker borrows
/// the pool through a [`crate::catalog::Catalog`].
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the catalog database given a `sqlite:` URL or a plain path.
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Enable WAL mode for concurrent reads
    /// 3. Run any pending migrations
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument(skip(db_url))]
    pub async fn connect(db_url: &str) -> Result<Self, DbError> {
        let db_url = if db_url.starts_with("sqlite:") {
            db_url.to_string()
        } else {
            format!("sqlite:{db_url}?mode=rwc")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        // Enable WAL mode for concurrent reads
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        // Set busy timeout to avoid immediate lock errors
        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"))
            .execute(&pool)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database for testing.
    ///
    /// The database exists only for the lifetime of the connection.
    /// WAL mode is not enabled since it provides no benefit in memory.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Gracefully closes all connections in the pool.
    ///
    /// Should be called before the process exits. After calling this
    /// method the Database instance must not be used.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_new_in_memory_succeeds() {
        let db = Database::new_in_memory().await;
        assert!(db.is_ok(), "Failed to create in-memory database");
    }

    #[tokio::test]
    async fn test_database_migrations_create_catalog_tables() {
        let db = Database::new_in_memory().await.unwrap();

        let result =
            sqlx::query("INSERT INTO directory (name, readable) VALUES ('pub/fedora/linux', 1)")
                .execute(db.pool())
                .await;

        assert!(
            result.is_ok(),
            "directory table should exist after migration"
        );
    }

    #[tokio::test]
    async fn test_database_hcd_path_is_unique_per_host_category() {
        let db = Database::new_in_memory().await.unwrap();

        sqlx::query("INSERT INTO site (name) VALUES ('s')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO host (site_id, name) VALUES (1, 'mirror.example.com')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO directory (name) VALUES ('pub/fedora')")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO category (name, topdir_id) VALUES ('Fedora', 1)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO host_category (host_id, category_id) VALUES (1, 1)")
            .execute(db.pool())
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO host_category_dir (host_category_id, path, up2date) VALUES (1, 'a/b', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let duplicate = sqlx::query(
            "INSERT INTO host_category_dir (host_category_id, path, up2date) VALUES (1, 'a/b', 0)",
        )
        .execute(db.pool())
        .await;

        assert!(
            duplicate.is_err(),
            "duplicate (host_category, path) should be rejected"
        );
    }

    #[tokio::test]
    async fn test_database_with_tempfile() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("catalog.db");

        let db = Database::connect(&db_path.display().to_string()).await;
        assert!(db.is_ok(), "Failed to create database at temp path");
    }

    #[tokio::test]
    async fn test_database_close_works() {
        let db = Database::new_in_memory().await.unwrap();
        db.close().await;
        // If we get here without panic, close worked
    }
}
