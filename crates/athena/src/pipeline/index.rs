//! Index sweep over every known share

use super::Pipeline;
use crate::error::Result;
use crate::indexer::{WalkSummary, WalkTotals, SINK_CAPACITY};
use athena_db::{FileEntry, Host, Repository, Share, ShareId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub hosts: usize,
    pub shares: usize,
    pub indexed: usize,
    pub totals: WalkTotals,
}

impl Pipeline {
    /// Re-index every share of every known host.
    ///
    /// Shares are walked concurrently, bounded by the index pool. A share's
    /// file rows are replaced by the first batch of a walk, so a share that
    /// can't be opened keeps its previous rows and stats. Each host with at
    /// least one indexed share gets a history point.
    pub async fn index_known_hosts(&self) -> Result<IndexSummary> {
        let hosts = self.repo.list_hosts_with_shares().await?;
        let share_count: usize = hosts.iter().map(|h| h.shares.len()).sum();
        info!(hosts = hosts.len(), shares = share_count, "Indexing known hosts");

        let mut tasks = JoinSet::new();
        for host in hosts.iter().cloned() {
            let pipeline = self.clone();
            tasks.spawn(async move { pipeline.index_host(host).await });
        }

        let mut summary = IndexSummary {
            hosts: hosts.len(),
            shares: share_count,
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((indexed, totals)) => {
                    summary.indexed += indexed;
                    summary.totals.size += totals.size;
                    summary.totals.file_count += totals.file_count;
                }
                Err(e) => warn!(error = %e, "Host index task failed"),
            }
        }

        info!(
            indexed = summary.indexed,
            shares = summary.shares,
            files = summary.totals.file_count,
            size = summary.totals.size,
            "Index sweep complete"
        );
        Ok(summary)
    }

    /// Index all shares of one host; returns how many completed and their totals.
    async fn index_host(&self, mut host: Host) -> (usize, WalkTotals) {
        let shares = std::mem::take(&mut host.shares);
        let host = Arc::new(host);

        let mut tasks = JoinSet::new();
        for share in shares {
            let pipeline = self.clone();
            let host = host.clone();
            tasks.spawn(async move { pipeline.index_one_share(&host, share).await });
        }

        let mut indexed = 0;
        let mut totals = WalkTotals::default();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(summary)) = joined {
                indexed += 1;
                totals.size += summary.totals.size;
                totals.file_count += summary.totals.file_count;
            }
        }

        if indexed > 0 {
            if let Err(e) = self.repo.append_host_history(host.id, totals.size, totals.file_count).await {
                warn!(host = %host.hostname, error = %e, "Failed to record host history");
            }
        }
        (indexed, totals)
    }

    /// Walk one share while a consumer persists its batches.
    ///
    /// Stats are only written when both the walk and every batch write
    /// succeeded.
    async fn index_one_share(&self, host: &Host, share: Share) -> Option<WalkSummary> {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);

        let walk = async {
            let result = self.indexer.index_share(host, &share, &tx).await;
            drop(tx);
            result
        };
        let persist = persist_batches(self.repo.as_ref(), share.id, rx);
        let (walked, persisted) = tokio::join!(walk, persist);

        let summary = match walked {
            Ok(summary) => summary,
            Err(e) if e.is_expected() => {
                debug!(host = %host.hostname, share = %share.name, error = %e, "Share unavailable, keeping previous index");
                return None;
            }
            Err(e) => {
                warn!(host = %host.hostname, share = %share.name, error = %e, "Share walk failed, keeping previous index");
                return None;
            }
        };
        if let Err(e) = persisted {
            warn!(host = %host.hostname, share = %share.name, error = %e, "Failed to persist share entries");
            return None;
        }

        let totals = summary.totals;
        if let Err(e) = self.repo.update_share_stats(share.id, totals.size, totals.file_count).await {
            warn!(host = %host.hostname, share = %share.name, error = %e, "Failed to update share stats");
            return None;
        }
        Some(summary)
    }
}

/// First batch replaces the share's rows, later ones append. Stops reading
/// on the first failed write, which ends the walk early.
async fn persist_batches(
    repo: &dyn Repository,
    share_id: ShareId,
    mut rx: mpsc::Receiver<Vec<FileEntry>>,
) -> athena_db::Result<u64> {
    let mut written = 0u64;
    while let Some(batch) = rx.recv().await {
        if written == 0 {
            repo.replace_files(share_id, &batch).await?;
        } else {
            repo.append_files(share_id, &batch).await?;
        }
        written += 1;
    }
    Ok(written)
}
