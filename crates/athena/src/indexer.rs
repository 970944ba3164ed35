//! Recursive share indexer
//!
//! Walks one share depth-first over a single session. Every directory's
//! entries go out as one batch (split at `batch_size`) after all of its
//! subdirectories have been walked, so a directory entry always carries the
//! aggregate size of everything below it.
//!
//! Listing failures never abort the walk: the failing subtree counts as
//! empty and the rest of the share is still indexed. There is no cycle or
//! depth guard; a share whose links loop back on themselves is walked until
//! the server stops answering.

use crate::discovery::WorkPool;
use crate::smb::{ProtocolError, ShareSession, ShareTransport};
use athena_db::{FileEntry, Host, Share};
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capacity of the channel between a walk and its persistence consumer
pub const SINK_CAPACITY: usize = 16;

pub type EntrySink = mpsc::Sender<Vec<FileEntry>>;

/// Aggregate size and file count of a subtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkTotals {
    pub size: u64,
    pub file_count: u64,
}

impl WalkTotals {
    fn add(&mut self, other: WalkTotals) {
        self.size += other.size;
        self.file_count += other.file_count;
    }
}

/// Outcome of one share walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub totals: WalkTotals,
    pub directories: u64,
    /// Subtrees skipped after an access-denied, auth or timeout failure
    pub unreachable: u64,
    /// Subtrees skipped after any other failure
    pub failed: u64,
    pub batches: u64,
    /// The consumer went away before the walk finished
    pub sink_closed: bool,
}

#[derive(Clone)]
pub struct Indexer {
    transport: Arc<dyn ShareTransport>,
    pool: WorkPool,
    batch_size: usize,
}

impl Indexer {
    pub fn new(transport: Arc<dyn ShareTransport>, pool: WorkPool, batch_size: usize) -> Self {
        Self {
            transport,
            pool,
            batch_size: batch_size.max(1),
        }
    }

    /// Walk `share` on `host`, sending entry batches to `sink`.
    ///
    /// Holds one index-pool slot for the whole walk. Failing to open the
    /// session or to list the share root is returned without sending
    /// anything, so the share's previous index stays in place. Deeper
    /// failures only prune their subtree. At least one batch (possibly
    /// empty) is sent on success so the consumer always sees the walk start.
    /// The session is closed once the recursion has fully returned.
    pub async fn index_share(&self, host: &Host, share: &Share, sink: &EntrySink) -> Result<WalkSummary, ProtocolError> {
        let addr: IpAddr = host
            .ip
            .parse()
            .map_err(|_| ProtocolError::other(format!("invalid host address '{}'", host.ip)))?;

        self.pool
            .run(async {
                let mut session = self.transport.connect(addr, &share.name).await?;
                debug!(host = %host.hostname, share = %share.name, "Share walk started");

                let mut walk = Walk {
                    session: session.as_mut(),
                    sink,
                    host: &host.hostname,
                    share: &share.name,
                    batch_size: self.batch_size,
                    summary: WalkSummary::default(),
                    root_error: None,
                };
                let totals = walk.directory(String::new()).await;
                if let Some(e) = walk.root_error.take() {
                    session.close().await;
                    return Err(e);
                }
                if walk.summary.batches == 0 {
                    walk.send(Vec::new()).await;
                }
                let mut summary = walk.summary;
                summary.totals = totals;

                session.close().await;

                info!(
                    host = %host.hostname,
                    share = %share.name,
                    files = totals.file_count,
                    size = totals.size,
                    directories = summary.directories,
                    unreachable = summary.unreachable,
                    "Share walk complete"
                );
                Ok(summary)
            })
            .await
    }
}

struct Walk<'a> {
    session: &'a mut dyn ShareSession,
    sink: &'a EntrySink,
    host: &'a str,
    share: &'a str,
    batch_size: usize,
    summary: WalkSummary,
    root_error: Option<ProtocolError>,
}

impl<'a> Walk<'a> {
    /// Walk the directory at `path` and return its totals.
    fn directory<'w>(&'w mut self, path: String) -> Pin<Box<dyn Future<Output = WalkTotals> + Send + 'w>> {
        Box::pin(async move {
            let listing = match self.session.list(&path).await {
                Ok(listing) => listing,
                Err(e) if path.is_empty() => {
                    self.root_error = Some(e);
                    return WalkTotals::default();
                }
                Err(e) => {
                    self.record_failure(&path, &e);
                    return WalkTotals::default();
                }
            };
            self.summary.directories += 1;

            let (dirs, files): (Vec<_>, Vec<_>) = listing.into_iter().partition(|entry| entry.is_directory);

            let mut totals = WalkTotals::default();
            let mut batch = Vec::with_capacity(dirs.len() + files.len());
            for file in files {
                totals.add(WalkTotals {
                    size: file.size,
                    file_count: 1,
                });
                batch.push(FileEntry::file(path.as_str(), file.name, file.size));
            }
            for dir in dirs {
                if self.summary.sink_closed {
                    break;
                }
                let child = format!("{path}{}\\", dir.name);
                let below = self.directory(child).await;
                totals.add(below);
                batch.push(FileEntry::directory(path.as_str(), dir.name, below.size));
            }

            self.emit(batch).await;
            totals
        })
    }

    async fn emit(&mut self, mut batch: Vec<FileEntry>) {
        while batch.len() > self.batch_size {
            let rest = batch.split_off(self.batch_size);
            self.send(batch).await;
            batch = rest;
        }
        if !batch.is_empty() {
            self.send(batch).await;
        }
    }

    async fn send(&mut self, batch: Vec<FileEntry>) {
        if self.summary.sink_closed {
            return;
        }
        if self.sink.send(batch).await.is_err() {
            debug!(host = %self.host, share = %self.share, "Entry consumer gone, stopping walk");
            self.summary.sink_closed = true;
            return;
        }
        self.summary.batches += 1;
    }

    fn record_failure(&mut self, path: &str, e: &ProtocolError) {
        if e.is_expected() {
            debug!(host = %self.host, share = %self.share, path, error = %e, "Subtree unreachable");
            self.summary.unreachable += 1;
        } else {
            warn!(host = %self.host, share = %self.share, path, error = %e, "Directory listing failed");
            self.summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb::memory::{MemoryShare, MemoryTransport};
    use crate::smb::ProtocolErrorKind;
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    const ADDR: &str = "10.0.0.7";

    fn host() -> Host {
        Host {
            id: 1,
            ip: ADDR.to_string(),
            hostname: "nas".to_string(),
            last_seen: Utc::now(),
            created_at: Utc::now(),
            shares: Vec::new(),
        }
    }

    fn share(name: &str) -> Share {
        Share {
            id: 1,
            host_id: 1,
            name: name.to_string(),
            file_count: 0,
            size: 0,
            updated_at: Utc::now(),
        }
    }

    async fn walk(transport: MemoryTransport, batch_size: usize) -> (Result<WalkSummary, ProtocolError>, Vec<Vec<FileEntry>>) {
        let indexer = Indexer::new(Arc::new(transport), WorkPool::new("index", 2), batch_size);
        let (tx, mut rx) = mpsc::channel(SINK_CAPACITY);

        let producer = async {
            let result = indexer.index_share(&host(), &share("public"), &tx).await;
            drop(tx);
            result
        };
        let consumer = async {
            let mut batches = Vec::new();
            while let Some(batch) = rx.recv().await {
                batches.push(batch);
            }
            batches
        };
        tokio::join!(producer, consumer)
    }

    #[tokio::test]
    async fn test_aggregate_sizes_and_batch_order() {
        let tree = MemoryShare::new()
            .file("a.txt", 100)
            .file("sub\\b.bin", 50)
            .file("sub\\c.bin", 25);
        let transport = MemoryTransport::new().share(ADDR.parse().unwrap(), "public", tree);
        let counters = transport.counters();

        let (result, batches) = walk(transport, 100).await;
        let summary = result.unwrap();

        assert_eq!(summary.totals, WalkTotals { size: 175, file_count: 3 });
        assert_eq!(summary.directories, 2);

        // Child directory first, then the root with the rolled-up size
        assert_eq!(batches.len(), 2);
        assert_eq!(
            batches[0],
            vec![FileEntry::file("sub\\", "b.bin", 50), FileEntry::file("sub\\", "c.bin", 25)]
        );
        assert_eq!(
            batches[1],
            vec![FileEntry::file("", "a.txt", 100), FileEntry::directory("", "sub", 75)]
        );

        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_subtree_counts_as_empty() {
        let tree = MemoryShare::new()
            .file("keep.txt", 10)
            .file("open\\x.txt", 5)
            .deny("secret", ProtocolErrorKind::AccessDenied);
        let transport = MemoryTransport::new().share(ADDR.parse().unwrap(), "public", tree);
        let counters = transport.counters();

        let (result, batches) = walk(transport, 100).await;
        let summary = result.unwrap();

        assert_eq!(summary.totals, WalkTotals { size: 15, file_count: 2 });
        assert_eq!(summary.unreachable, 1);
        let root = batches.last().unwrap();
        assert!(root.contains(&FileEntry::directory("", "secret", 0)));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_large_directory_is_split() {
        let mut tree = MemoryShare::new();
        for i in 0..7 {
            tree = tree.file(&format!("f{i}.dat"), 1);
        }
        let transport = MemoryTransport::new().share(ADDR.parse().unwrap(), "public", tree);

        let (result, batches) = walk(transport, 3).await;
        assert_eq!(result.unwrap().batches, 3);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_empty_share_sends_one_empty_batch() {
        let transport = MemoryTransport::new().share(ADDR.parse().unwrap(), "public", MemoryShare::new());

        let (result, batches) = walk(transport, 10).await;
        assert_eq!(result.unwrap().totals, WalkTotals::default());
        assert_eq!(batches, vec![Vec::<FileEntry>::new()]);
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned() {
        let tree = MemoryShare::new().refuse(ProtocolErrorKind::AuthFailure);
        let transport = MemoryTransport::new().share(ADDR.parse().unwrap(), "public", tree);
        let counters = transport.counters();

        let (result, batches) = walk(transport, 10).await;
        assert_eq!(result.unwrap_err().kind, ProtocolErrorKind::AuthFailure);
        assert!(batches.is_empty());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unlistable_root_fails_without_batches() {
        let tree = MemoryShare::new()
            .file("a.txt", 1)
            .deny("", ProtocolErrorKind::Timeout);
        let transport = MemoryTransport::new().share(ADDR.parse().unwrap(), "public", tree);
        let counters = transport.counters();

        let (result, batches) = walk(transport, 10).await;
        assert_eq!(result.unwrap_err().kind, ProtocolErrorKind::Timeout);
        assert!(batches.is_empty());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }
}
