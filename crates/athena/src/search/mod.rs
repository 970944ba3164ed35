//! Search and statistics over the index
//!
//! Candidates are every file or directory whose name contains all query
//! tokens; they are ranked by edit distance between the filename and the
//! raw query and then paginated.

mod tokenize;

pub use tokenize::{edit_distance, tokenize};

use athena_db::{DbError, FileRecord, Host, HostHistory, HostId, Keyword, Repository, Scan};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Scan task whose latest run is reported as the last full scan
pub const FULL_SCAN_TASK: &str = "index_known_hosts";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Query has no searchable terms")]
    EmptyQuery,

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    pub share: String,
    pub hostname: String,
    /// `\\host\share\path\filename`
    pub full_path: String,
    pub distance: usize,
}

impl SearchHit {
    fn from_record(record: FileRecord, query: &str) -> Self {
        Self {
            distance: edit_distance(&record.filename, query),
            full_path: record.full_path(),
            filename: record.filename,
            path: record.path,
            size: record.size,
            is_directory: record.is_directory,
            share: record.share_name,
            hostname: record.hostname,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub last_full_scan: Option<Scan>,
    pub keyword_count: u64,
    /// Hosts with their shares' names, sizes and file counts
    pub hosts: Vec<Host>,
}

#[derive(Clone)]
pub struct SearchService {
    repo: Arc<dyn Repository>,
    candidate_limit: usize,
}

impl SearchService {
    pub fn new(repo: Arc<dyn Repository>, candidate_limit: usize) -> Self {
        Self {
            repo,
            candidate_limit: candidate_limit.max(1),
        }
    }

    /// Ranked hits `[start, start + max)` for `query`.
    pub async fn search(&self, query: &str, start: usize, max: usize) -> Result<Vec<SearchHit>, SearchError> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let candidates = self.repo.find_by_keywords(&tokens, self.candidate_limit).await?;
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .map(|record| SearchHit::from_record(record, query))
            .collect();
        // Stable: equal distances keep store order
        hits.sort_by_key(|hit| hit.distance);

        Ok(hits.into_iter().skip(start).take(max).collect())
    }

    pub async fn get_statistics(&self) -> Result<Statistics, SearchError> {
        Ok(Statistics {
            last_full_scan: self.repo.latest_scan(FULL_SCAN_TASK).await?,
            keyword_count: self.repo.keyword_count().await?,
            hosts: self.repo.list_hosts_with_shares().await?,
        })
    }

    pub async fn host_history(&self, host_id: HostId) -> Result<Vec<HostHistory>, SearchError> {
        Ok(self.repo.host_history(host_id).await?)
    }

    pub async fn top_keywords(&self, limit: usize) -> Result<Vec<Keyword>, SearchError> {
        Ok(self.repo.keywords(limit).await?)
    }

    /// `Ok` when the store answers a trivial query
    pub async fn health(&self) -> Result<(), SearchError> {
        Ok(self.repo.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_db::{AthenaDb, FileEntry};
    use chrono::Utc;

    async fn seeded() -> (tempfile::TempDir, AthenaDb) {
        let tmp = tempfile::TempDir::new().unwrap();
        let db = AthenaDb::open(tmp.path().join("athena.sqlite3")).await.unwrap();

        let host_id = db.upsert_host("10.0.0.7", "nas").await.unwrap();
        let share_id = db.upsert_share(host_id, "media").await.unwrap();
        db.replace_files(
            share_id,
            &[
                FileEntry::file("", "holiday.mp4", 900),
                FileEntry::file("2023\\", "holiday video final.mp4", 500),
                FileEntry::directory("", "holiday", 1400),
                FileEntry::file("", "notes.txt", 3),
            ],
        )
        .await
        .unwrap();
        (tmp, db)
    }

    #[tokio::test]
    async fn test_search_ranks_by_distance() {
        let (_tmp, db) = seeded().await;
        let service = SearchService::new(Arc::new(db), 100);

        let hits = service.search("holiday", 0, 10).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.filename.as_str()).collect();
        assert_eq!(names, vec!["holiday", "holiday.mp4", "holiday video final.mp4"]);

        let dir = &hits[0];
        assert!(dir.is_directory);
        assert_eq!(dir.full_path, "\\\\nas\\media\\holiday");
        assert_eq!(hits[2].full_path, "\\\\nas\\media\\2023\\holiday video final.mp4");
    }

    #[tokio::test]
    async fn test_search_requires_every_token_and_paginates() {
        let (_tmp, db) = seeded().await;
        let service = SearchService::new(Arc::new(db), 100);

        let hits = service.search("Holiday MP4", 0, 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let page = service.search("holiday", 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].filename, "holiday.mp4");

        assert!(service.search("holiday", 10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query() {
        let (_tmp, db) = seeded().await;
        let service = SearchService::new(Arc::new(db), 100);

        assert!(matches!(service.search(" .-_ ", 0, 10).await, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn test_statistics_and_health() {
        let (_tmp, db) = seeded().await;
        db.append_scan(FULL_SCAN_TASK, Utc::now(), 1500).await.unwrap();
        let service = SearchService::new(Arc::new(db), 100);

        let stats = service.get_statistics().await.unwrap();
        assert_eq!(stats.last_full_scan.unwrap().runtime_ms, 1500);
        assert_eq!(stats.hosts.len(), 1);
        assert_eq!(stats.hosts[0].shares[0].name, "media");

        service.health().await.unwrap();
    }

    #[tokio::test]
    async fn test_search_matches_non_ascii_case_insensitively() {
        let (_tmp, db) = seeded().await;
        let host_id = db.upsert_host("10.0.0.8", "archiv").await.unwrap();
        let share_id = db.upsert_share(host_id, "berichte").await.unwrap();
        db.replace_files(share_id, &[FileEntry::file("", "Über Bericht.pdf", 42)])
            .await
            .unwrap();
        let service = SearchService::new(Arc::new(db), 100);

        for query in ["über", "ÜBER bericht"] {
            let hits = service.search(query, 0, 10).await.unwrap();
            assert_eq!(hits.len(), 1, "query {query:?}");
            assert_eq!(hits[0].full_path, "\\\\archiv\\berichte\\Über Bericht.pdf");
        }
    }
}
