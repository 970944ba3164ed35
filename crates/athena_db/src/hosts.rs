//! Host operations (identity, liveness, history)

use crate::error::Result;
use crate::types::*;
use crate::AthenaDb;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info};

impl AthenaDb {
    // ========================================================================
    // Host Operations
    // ========================================================================

    /// Insert or update a host by `ip`, refreshing `hostname` and `last_seen`.
    ///
    /// The hostname is case-folded before it is compared or stored. Keeps
    /// both `ip` and `hostname` unique: when the hostname currently belongs
    /// to a different row, that row is either moved to `ip` (no row exists
    /// for `ip` yet) or removed as stale.
    ///
    /// The transaction takes the write lock up front; a deferred one would
    /// fail with `SQLITE_BUSY_SNAPSHOT` when concurrent upserts race from
    /// read to write.
    pub async fn upsert_host(&self, ip: &str, hostname: &str) -> Result<HostId> {
        let folded = fold_name(hostname.trim());
        let hostname = folded.as_str();
        let now = Self::now_millis();
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let by_ip: Option<i64> = sqlx::query_scalar("SELECT id FROM hosts WHERE ip = ?")
            .bind(ip)
            .fetch_optional(&mut *tx)
            .await?;
        let by_name: Option<i64> = sqlx::query_scalar("SELECT id FROM hosts WHERE hostname = ?")
            .bind(hostname)
            .fetch_optional(&mut *tx)
            .await?;

        let id = match (by_ip, by_name) {
            (Some(id), Some(other)) if other != id => {
                info!(ip, hostname, stale_id = other, "Hostname moved to another address, dropping stale host");
                sqlx::query("DELETE FROM hosts WHERE id = ?")
                    .bind(other)
                    .execute(&mut *tx)
                    .await?;
                self.touch_host(&mut tx, id, ip, hostname, now).await?;
                id
            }
            (Some(id), _) => {
                self.touch_host(&mut tx, id, ip, hostname, now).await?;
                id
            }
            (None, Some(other)) => {
                info!(ip, hostname, host_id = other, "Known host changed address");
                self.touch_host(&mut tx, other, ip, hostname, now).await?;
                other
            }
            (None, None) => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO hosts (ip, hostname, last_seen, created_at)
                    VALUES (?, ?, ?, ?)
                    "#,
                )
                .bind(ip)
                .bind(hostname)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                debug!(ip, hostname, "New host");
                result.last_insert_rowid()
            }
        };

        tx.commit().await?;
        Ok(id)
    }

    async fn touch_host(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: HostId,
        ip: &str,
        hostname: &str,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE hosts SET
                ip = ?,
                hostname = ?,
                last_seen = MAX(last_seen, ?)
            WHERE id = ?
            "#,
        )
        .bind(ip)
        .bind(hostname)
        .bind(now)
        .bind(id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Record that a host answered; never moves `last_seen` backwards.
    pub async fn update_last_seen(&self, host_id: HostId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE hosts SET last_seen = MAX(last_seen, ?) WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(host_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// List all hosts (shares not loaded)
    pub async fn list_hosts(&self) -> Result<Vec<Host>> {
        let rows = sqlx::query(
            "SELECT id, ip, hostname, last_seen, created_at FROM hosts ORDER BY hostname",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_host).collect())
    }

    /// List all hosts with their shares eager-loaded
    pub async fn list_hosts_with_shares(&self) -> Result<Vec<Host>> {
        let mut hosts = self.list_hosts().await?;
        let shares = self.list_shares().await?;

        let mut by_host: HashMap<HostId, Vec<Share>> = HashMap::new();
        for share in shares {
            by_host.entry(share.host_id).or_default().push(share);
        }
        for host in &mut hosts {
            host.shares = by_host.remove(&host.id).unwrap_or_default();
        }

        Ok(hosts)
    }

    // ========================================================================
    // Host History
    // ========================================================================

    /// Append one point to a host's size/file-count history
    pub async fn append_host_history(&self, host_id: HostId, size: u64, file_count: u64) -> Result<()> {
        sqlx::query(
            "INSERT INTO host_history (host_id, size, file_count, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(host_id)
        .bind(size as i64)
        .bind(file_count as i64)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// History of a host, oldest first
    pub async fn host_history(&self, host_id: HostId) -> Result<Vec<HostHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT host_id, size, file_count, recorded_at FROM host_history
            WHERE host_id = ?
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| HostHistory {
                host_id: row.get("host_id"),
                size: row.get::<i64, _>("size") as u64,
                file_count: row.get::<i64, _>("file_count") as u64,
                recorded_at: Self::millis_to_datetime(row.get("recorded_at")),
            })
            .collect())
    }
}

fn row_to_host(row: &sqlx::sqlite::SqliteRow) -> Host {
    Host {
        id: row.get("id"),
        ip: row.get("ip"),
        hostname: row.get("hostname"),
        last_seen: AthenaDb::millis_to_datetime(row.get("last_seen")),
        created_at: AthenaDb::millis_to_datetime(row.get("created_at")),
        shares: Vec::new(),
    }
}
