//! Schema creation for all Athena tables.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! Timestamps are stored as milliseconds since the Unix epoch.

use crate::error::Result;
use crate::AthenaDb;
use tracing::info;

impl AthenaDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        self.create_index_tables().await?;
        self.create_history_tables().await?;

        info!("Database schema verified");
        Ok(())
    }

    /// Hosts, shares and files (the ownership chain)
    async fn create_index_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS hosts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL UNIQUE,
                hostname TEXT NOT NULL UNIQUE,
                last_seen INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS shares (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                file_count INTEGER NOT NULL DEFAULT 0,
                size INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                UNIQUE(host_id, name)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                share_id INTEGER NOT NULL REFERENCES shares(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                filename_folded TEXT NOT NULL DEFAULT '',
                path TEXT NOT NULL,
                size INTEGER NOT NULL,
                is_directory INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        self.ensure_filename_folded().await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_shares_host ON shares(host_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_share ON files(share_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_filename ON files(filename)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Add `files.filename_folded` to databases created before it existed.
    ///
    /// Backfilled rows are folded by SQLite (ASCII only) until the next index
    /// sweep rewrites them.
    async fn ensure_filename_folded(&self) -> Result<()> {
        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('files')")
            .fetch_all(&self.pool)
            .await?;
        if columns.iter().any(|name| name == "filename_folded") {
            return Ok(());
        }

        sqlx::query("ALTER TABLE files ADD COLUMN filename_folded TEXT NOT NULL DEFAULT ''")
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE files SET filename_folded = lower(filename)")
            .execute(&self.pool)
            .await?;
        info!("Added files.filename_folded");
        Ok(())
    }

    /// Scan log, host history and the derived keyword table
    async fn create_history_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                runtime_ms INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS host_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
                size INTEGER NOT NULL DEFAULT 0,
                file_count INTEGER NOT NULL DEFAULT 0,
                recorded_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS keywords (
                keyword TEXT PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_scans_task ON scans(task, start_time DESC)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_host_history_host ON host_history(host_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
