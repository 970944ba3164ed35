//! Share operations

use crate::error::{DbError, Result};
use crate::types::*;
use crate::AthenaDb;
use sqlx::Row;

impl AthenaDb {
    /// Insert or update a share by `(host_id, name)`, bumping `updated_at`.
    pub async fn upsert_share(&self, host_id: HostId, name: &str) -> Result<ShareId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO shares (host_id, name, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(host_id, name) DO UPDATE SET
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(host_id)
        .bind(name)
        .bind(Self::now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                DbError::constraint(format!("host {host_id} does not exist"))
            }
            other => DbError::Sqlx(other),
        })?;

        Ok(id)
    }

    /// Store the totals of the latest completed walk of a share
    pub async fn update_share_stats(&self, share_id: ShareId, size: u64, file_count: u64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE shares SET
                size = ?,
                file_count = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(size as i64)
        .bind(file_count as i64)
        .bind(Self::now_millis())
        .bind(share_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!("share {share_id}")));
        }
        Ok(())
    }

    /// Get a share by ID
    pub async fn get_share(&self, share_id: ShareId) -> Result<Option<Share>> {
        let row = sqlx::query(
            "SELECT id, host_id, name, file_count, size, updated_at FROM shares WHERE id = ?",
        )
        .bind(share_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_share))
    }

    /// List every share, grouped by host
    pub async fn list_shares(&self) -> Result<Vec<Share>> {
        let rows = sqlx::query(
            "SELECT id, host_id, name, file_count, size, updated_at FROM shares ORDER BY host_id, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_share).collect())
    }
}

fn row_to_share(row: &sqlx::sqlite::SqliteRow) -> Share {
    Share {
        id: row.get("id"),
        host_id: row.get("host_id"),
        name: row.get("name"),
        file_count: row.get::<i64, _>("file_count") as u64,
        size: row.get::<i64, _>("size") as u64,
        updated_at: AthenaDb::millis_to_datetime(row.get("updated_at")),
    }
}
