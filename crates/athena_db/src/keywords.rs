//! Keyword index operations

use crate::error::Result;
use crate::types::*;
use crate::AthenaDb;
use sqlx::Row;
use std::collections::HashMap;

impl AthenaDb {
    /// Truncate the keyword table and refill it from `counts`.
    ///
    /// Runs in one transaction, so readers see either the old or the new index.
    pub async fn rebuild_keyword_index(&self, counts: &HashMap<String, u64>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM keywords").execute(&mut *tx).await?;
        for (keyword, count) in counts {
            sqlx::query("INSERT INTO keywords (keyword, count) VALUES (?, ?)")
                .bind(keyword)
                .bind(*count as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Most frequent keywords first
    pub async fn keywords(&self, limit: usize) -> Result<Vec<Keyword>> {
        let rows = sqlx::query(
            "SELECT keyword, count FROM keywords ORDER BY count DESC, keyword ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Keyword {
                keyword: row.get("keyword"),
                count: row.get::<i64, _>("count") as u64,
            })
            .collect())
    }

    /// Number of distinct keywords
    pub async fn keyword_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keywords")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Trivial round-trip used by health checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
