//! Scan log operations

use crate::error::Result;
use crate::types::*;
use crate::AthenaDb;
use chrono::{DateTime, Utc};
use sqlx::Row;

impl AthenaDb {
    /// Append a run record for a phase
    pub async fn append_scan(&self, task: &str, start_time: DateTime<Utc>, runtime_ms: u64) -> Result<ScanId> {
        let result = sqlx::query("INSERT INTO scans (task, start_time, runtime_ms) VALUES (?, ?, ?)")
            .bind(task)
            .bind(start_time.timestamp_millis())
            .bind(runtime_ms as i64)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent run of a phase, by start time
    pub async fn latest_scan(&self, task: &str) -> Result<Option<Scan>> {
        let row = sqlx::query(
            r#"
            SELECT id, task, start_time, runtime_ms FROM scans
            WHERE task = ?
            ORDER BY start_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(task)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Scan {
            id: row.get("id"),
            task: row.get("task"),
            start_time: Self::millis_to_datetime(row.get("start_time")),
            runtime_ms: row.get::<i64, _>("runtime_ms") as u64,
        }))
    }

    /// Number of recorded runs of a phase
    pub async fn count_scans(&self, task: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scans WHERE task = ?")
            .bind(task)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::open_temp;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_latest_scan_by_start_time() {
        let (_tmp, db) = open_temp().await;
        let now = Utc::now();

        db.append_scan("index_known_hosts", now, 1200).await.unwrap();
        // Appended later but started earlier
        db.append_scan("index_known_hosts", now - Duration::minutes(10), 50)
            .await
            .unwrap();
        db.append_scan("ping_known_hosts", now + Duration::minutes(1), 7)
            .await
            .unwrap();

        let latest = db.latest_scan("index_known_hosts").await.unwrap().unwrap();
        assert_eq!(latest.runtime_ms, 1200);
        assert_eq!(latest.start_time.timestamp_millis(), now.timestamp_millis());
        assert_eq!(db.count_scans("index_known_hosts").await.unwrap(), 2);
        assert!(db.latest_scan("post_processing").await.unwrap().is_none());
    }
}
