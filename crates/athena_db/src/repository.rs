//! The storage contract the discovery pipeline and search consumer depend on.
//!
//! Each call is atomic on its own; nothing here spans several entities in one
//! transaction. Backends are swappable behind this trait; [`AthenaDb`] is the
//! SQLite one.

use crate::error::Result;
use crate::types::*;
use crate::AthenaDb;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Insert-or-update by `ip`; refreshes `hostname` and `last_seen`
    async fn upsert_host(&self, ip: &str, hostname: &str) -> Result<HostId>;

    /// Insert-or-update by `(host_id, name)`
    async fn upsert_share(&self, host_id: HostId, name: &str) -> Result<ShareId>;

    /// Delete all file rows of the share, then bulk-insert `entries`
    async fn replace_files(&self, share_id: ShareId, entries: &[FileEntry]) -> Result<()>;

    /// Bulk-insert `entries` after an earlier `replace_files` of the same walk
    async fn append_files(&self, share_id: ShareId, entries: &[FileEntry]) -> Result<()>;

    async fn update_share_stats(&self, share_id: ShareId, size: u64, file_count: u64) -> Result<()>;

    async fn update_last_seen(&self, host_id: HostId, at: DateTime<Utc>) -> Result<()>;

    async fn append_scan(&self, task: &str, start_time: DateTime<Utc>, runtime_ms: u64) -> Result<ScanId>;

    /// Latest run of `task` by start time
    async fn latest_scan(&self, task: &str) -> Result<Option<Scan>>;

    async fn list_hosts(&self) -> Result<Vec<Host>>;

    /// Hosts with `shares` populated
    async fn list_hosts_with_shares(&self) -> Result<Vec<Host>>;

    async fn list_files(&self, share_id: ShareId) -> Result<Vec<FileRecord>>;

    async fn list_filenames(&self) -> Result<Vec<String>>;

    /// Truncate and refill the keyword index
    async fn rebuild_keyword_index(&self, counts: &HashMap<String, u64>) -> Result<()>;

    async fn keyword_count(&self) -> Result<u64>;

    /// Most frequent first
    async fn keywords(&self, limit: usize) -> Result<Vec<Keyword>>;

    /// Files/directories whose name contains every keyword
    async fn find_by_keywords(&self, keywords: &[String], limit: usize) -> Result<Vec<FileRecord>>;

    async fn append_host_history(&self, host_id: HostId, size: u64, file_count: u64) -> Result<()>;

    async fn host_history(&self, host_id: HostId) -> Result<Vec<HostHistory>>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl Repository for AthenaDb {
    async fn upsert_host(&self, ip: &str, hostname: &str) -> Result<HostId> {
        AthenaDb::upsert_host(self, ip, hostname).await
    }

    async fn upsert_share(&self, host_id: HostId, name: &str) -> Result<ShareId> {
        AthenaDb::upsert_share(self, host_id, name).await
    }

    async fn replace_files(&self, share_id: ShareId, entries: &[FileEntry]) -> Result<()> {
        AthenaDb::replace_files(self, share_id, entries).await
    }

    async fn append_files(&self, share_id: ShareId, entries: &[FileEntry]) -> Result<()> {
        AthenaDb::append_files(self, share_id, entries).await
    }

    async fn update_share_stats(&self, share_id: ShareId, size: u64, file_count: u64) -> Result<()> {
        AthenaDb::update_share_stats(self, share_id, size, file_count).await
    }

    async fn update_last_seen(&self, host_id: HostId, at: DateTime<Utc>) -> Result<()> {
        AthenaDb::update_last_seen(self, host_id, at).await
    }

    async fn append_scan(&self, task: &str, start_time: DateTime<Utc>, runtime_ms: u64) -> Result<ScanId> {
        AthenaDb::append_scan(self, task, start_time, runtime_ms).await
    }

    async fn latest_scan(&self, task: &str) -> Result<Option<Scan>> {
        AthenaDb::latest_scan(self, task).await
    }

    async fn list_hosts(&self) -> Result<Vec<Host>> {
        AthenaDb::list_hosts(self).await
    }

    async fn list_hosts_with_shares(&self) -> Result<Vec<Host>> {
        AthenaDb::list_hosts_with_shares(self).await
    }

    async fn list_files(&self, share_id: ShareId) -> Result<Vec<FileRecord>> {
        AthenaDb::list_files(self, share_id).await
    }

    async fn list_filenames(&self) -> Result<Vec<String>> {
        AthenaDb::list_filenames(self).await
    }

    async fn rebuild_keyword_index(&self, counts: &HashMap<String, u64>) -> Result<()> {
        AthenaDb::rebuild_keyword_index(self, counts).await
    }

    async fn keyword_count(&self) -> Result<u64> {
        AthenaDb::keyword_count(self).await
    }

    async fn keywords(&self, limit: usize) -> Result<Vec<Keyword>> {
        AthenaDb::keywords(self, limit).await
    }

    async fn find_by_keywords(&self, keywords: &[String], limit: usize) -> Result<Vec<FileRecord>> {
        AthenaDb::find_by_keywords(self, keywords, limit).await
    }

    async fn append_host_history(&self, host_id: HostId, size: u64, file_count: u64) -> Result<()> {
        AthenaDb::append_host_history(self, host_id, size, file_count).await
    }

    async fn host_history(&self, host_id: HostId) -> Result<Vec<HostHistory>> {
        AthenaDb::host_history(self, host_id).await
    }

    async fn ping(&self) -> Result<()> {
        AthenaDb::ping(self).await
    }
}
