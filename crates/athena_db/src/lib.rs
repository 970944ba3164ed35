//! Storage layer for Athena
//!
//! This crate owns every persisted entity of the share index: hosts, shares,
//! files, scan records, per-host history and the derived keyword index.
//! Pipeline code talks to it only through the [`Repository`] trait; [`AthenaDb`]
//! is the SQLite-backed implementation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use athena_db::{AthenaDb, Repository};
//!
//! let db = AthenaDb::open("~/.athena/athena.sqlite3").await?;
//! let host_id = db.upsert_host("10.0.0.7", "fileserver").await?;
//! let share_id = db.upsert_share(host_id, "public").await?;
//! ```

mod error;
mod schema;
mod types;

// Method implementations organized by entity
mod files;
mod hosts;
mod keywords;
mod repository;
mod scans;
mod shares;

pub use error::{DbError, Result};
pub use repository::Repository;
pub use types::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite-backed repository.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct AthenaDb {
    pool: SqlitePool,
}

impl AthenaDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Pragmas go on the connect options so every pooled connection gets them
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for ad hoc queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl AthenaDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert stored milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}
