//! File index operations

use crate::error::Result;
use crate::types::*;
use crate::AthenaDb;
use sqlx::Row;

const FILE_RECORD_SELECT: &str = r#"
    SELECT f.id, f.share_id, f.filename, f.path, f.size, f.is_directory,
           s.name AS share_name, h.hostname
    FROM files f
    JOIN shares s ON s.id = f.share_id
    JOIN hosts h ON h.id = s.host_id
"#;

impl AthenaDb {
    /// Delete every file row of a share, then bulk-insert `entries`.
    ///
    /// Delete and insert commit together, but a reader between two
    /// `replace_files`/`append_files` calls of one walk sees a partial share.
    pub async fn replace_files(&self, share_id: ShareId, entries: &[FileEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM files WHERE share_id = ?")
            .bind(share_id)
            .execute(&mut *tx)
            .await?;
        insert_entries(&mut tx, share_id, entries).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Bulk-insert `entries` without touching existing rows
    pub async fn append_files(&self, share_id: ShareId, entries: &[FileEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        insert_entries(&mut tx, share_id, entries).await?;
        tx.commit().await?;
        Ok(())
    }

    /// All file rows of one share
    pub async fn list_files(&self, share_id: ShareId) -> Result<Vec<FileRecord>> {
        let sql = format!("{FILE_RECORD_SELECT} WHERE f.share_id = ? ORDER BY f.id");
        let rows = sqlx::query(&sql).bind(share_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_file_record).collect())
    }

    /// Every current filename (directories included)
    pub async fn list_filenames(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar("SELECT filename FROM files")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Files and directories whose folded name contains every folded keyword
    pub async fn find_by_keywords(&self, keywords: &[String], limit: usize) -> Result<Vec<FileRecord>> {
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut sql = String::from(FILE_RECORD_SELECT);
        sql.push_str(" WHERE ");
        let clauses = vec!["f.filename_folded LIKE ? ESCAPE '\\'"; keywords.len()];
        sql.push_str(&clauses.join(" AND "));
        sql.push_str(" ORDER BY f.id LIMIT ?");

        let mut query = sqlx::query(&sql);
        for keyword in keywords {
            query = query.bind(like_pattern(keyword));
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_file_record).collect())
    }
}

async fn insert_entries(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    share_id: ShareId,
    entries: &[FileEntry],
) -> Result<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO files (share_id, filename, filename_folded, path, size, is_directory)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(share_id)
        .bind(&entry.filename)
        .bind(fold_name(&entry.filename))
        .bind(&entry.path)
        .bind(entry.size as i64)
        .bind(entry.is_directory)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// `%keyword%` with LIKE wildcards escaped
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for ch in fold_name(keyword).chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn row_to_file_record(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        id: row.get("id"),
        share_id: row.get("share_id"),
        filename: row.get("filename"),
        path: row.get("path"),
        size: row.get::<i64, _>("size") as u64,
        is_directory: row.get("is_directory"),
        share_name: row.get("share_name"),
        hostname: row.get("hostname"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_temp;

    async fn seeded() -> (tempfile::TempDir, AthenaDb, ShareId) {
        let (tmp, db) = open_temp().await;
        let host = db.upsert_host("10.0.0.1", "alpha").await.unwrap();
        let share = db.upsert_share(host, "media").await.unwrap();
        (tmp, db, share)
    }

    #[tokio::test]
    async fn test_replace_files_discards_previous_run() {
        let (_tmp, db, share) = seeded().await;

        db.replace_files(
            share,
            &[
                FileEntry::file("", "old.txt", 10),
                FileEntry::file("", "gone.txt", 20),
            ],
        )
        .await
        .unwrap();

        let latest = vec![
            FileEntry::file("", "a.txt", 100),
            FileEntry::directory("", "sub", 75),
            FileEntry::file("sub\\", "b.txt", 50),
        ];
        db.replace_files(share, &latest[..1]).await.unwrap();
        db.append_files(share, &latest[1..]).await.unwrap();

        let stored: Vec<FileEntry> = db
            .list_files(share)
            .await
            .unwrap()
            .iter()
            .map(FileRecord::entry)
            .collect();
        assert_eq!(stored, latest);
    }

    #[tokio::test]
    async fn test_replace_files_with_empty_clears_share() {
        let (_tmp, db, share) = seeded().await;
        db.replace_files(share, &[FileEntry::file("", "a.txt", 1)])
            .await
            .unwrap();

        db.replace_files(share, &[]).await.unwrap();
        assert!(db.list_files(share).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_keywords_requires_all() {
        let (_tmp, db, share) = seeded().await;
        db.replace_files(
            share,
            &[
                FileEntry::file("tv\\", "Game.of.Thrones.S01E01.mp4", 700),
                FileEntry::file("tv\\", "Game.Night.2018.mkv", 900),
                FileEntry::directory("", "Thrones", 0),
            ],
        )
        .await
        .unwrap();

        let hits = db
            .find_by_keywords(&["game".into(), "thrones".into()], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "Game.of.Thrones.S01E01.mp4");
        assert_eq!(hits[0].hostname, "alpha");
        assert_eq!(hits[0].share_name, "media");
        assert_eq!(hits[0].full_path(), "\\\\alpha\\media\\tv\\Game.of.Thrones.S01E01.mp4");

        let dirs = db.find_by_keywords(&["thrones".into()], 10).await.unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.iter().any(|f| f.is_directory));

        let limited = db.find_by_keywords(&["game".into()], 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_keywords_escapes_wildcards() {
        let (_tmp, db, share) = seeded().await;
        db.replace_files(
            share,
            &[
                FileEntry::file("", "100%_done.txt", 1),
                FileEntry::file("", "100xxdone.txt", 1),
            ],
        )
        .await
        .unwrap();

        let hits = db.find_by_keywords(&["%_".into()], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "100%_done.txt");
        assert!(db.find_by_keywords(&[], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_files_cascade_with_share_host() {
        let (_tmp, db, share) = seeded().await;
        db.replace_files(share, &[FileEntry::file("", "a.txt", 1)])
            .await
            .unwrap();

        sqlx::query("DELETE FROM hosts").execute(db.pool()).await.unwrap();
        assert!(db.list_filenames().await.unwrap().is_empty());
        assert!(db.list_shares().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_keywords_folds_non_ascii() {
        let (_tmp, db, share) = seeded().await;
        db.replace_files(
            share,
            &[
                FileEntry::file("", "Über Bericht.pdf", 10),
                FileEntry::file("", "ÉTÉ 2023.jpg", 20),
                FileEntry::file("", "uber.txt", 30),
            ],
        )
        .await
        .unwrap();

        let hits = db.find_by_keywords(&["über".into()], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "Über Bericht.pdf");

        let hits = db.find_by_keywords(&["ÉTÉ".into()], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "ÉTÉ 2023.jpg");
    }
}
