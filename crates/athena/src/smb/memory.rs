//! In-memory share backend
//!
//! Serves fixed directory trees keyed by address and share name. Used by the
//! test suites and for dry runs of the pipeline without a network.

use super::{ProtocolError, ProtocolErrorKind, RemoteEntry, ShareSession, ShareTransport};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One share's tree: directory path to its listing (or listing failure).
#[derive(Debug, Clone, Default)]
pub struct MemoryShare {
    listings: BTreeMap<String, Result<Vec<RemoteEntry>, ProtocolErrorKind>>,
    connect_error: Option<ProtocolErrorKind>,
}

impl MemoryShare {
    pub fn new() -> Self {
        let mut listings = BTreeMap::new();
        listings.insert(String::new(), Ok(Vec::new()));
        Self {
            listings,
            connect_error: None,
        }
    }

    /// Add a file at `path` (`"dir\\sub\\name.ext"`), creating parent directories.
    pub fn file(mut self, path: &str, size: u64) -> Self {
        let (parent, name) = split_path(path);
        let parent = self.ensure_dir(parent);
        self.push(&parent, RemoteEntry::file(name, size));
        self
    }

    /// Add an empty directory at `path` (`"dir\\sub"`), creating parents.
    pub fn dir(mut self, path: &str) -> Self {
        self.ensure_dir(path);
        self
    }

    /// Make listing the directory at `path` fail with `kind`.
    pub fn deny(mut self, path: &str, kind: ProtocolErrorKind) -> Self {
        let dir = self.ensure_dir(path);
        self.listings.insert(dir, Err(kind));
        self
    }

    /// Make opening a session on this share fail.
    pub fn refuse(mut self, kind: ProtocolErrorKind) -> Self {
        self.connect_error = Some(kind);
        self
    }

    /// Create `path` and its ancestors; returns the protocol-form path.
    fn ensure_dir(&mut self, path: &str) -> String {
        let path = path.trim_matches('\\');
        if path.is_empty() {
            return String::new();
        }
        let (parent, name) = split_path(path);
        let parent = self.ensure_dir(parent);
        let dir = format!("{parent}{name}\\");
        if !self.listings.contains_key(&dir) {
            self.push(&parent, RemoteEntry::directory(name));
            self.listings.insert(dir.clone(), Ok(Vec::new()));
        }
        dir
    }

    fn push(&mut self, dir: &str, entry: RemoteEntry) {
        if let Some(Ok(entries)) = self.listings.get_mut(dir) {
            entries.push(entry);
        }
    }
}

fn split_path(path: &str) -> (&str, &str) {
    let path = path.trim_matches('\\');
    match path.rsplit_once('\\') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryHost {
    shares: BTreeMap<String, Arc<MemoryShare>>,
    list_error: Option<ProtocolErrorKind>,
}

/// Counters observed by tests
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub listings: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    hosts: HashMap<IpAddr, MemoryHost>,
    latency: Option<Duration>,
    counters: Arc<SessionCounters>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn share(mut self, addr: IpAddr, name: &str, share: MemoryShare) -> Self {
        self.hosts
            .entry(addr)
            .or_default()
            .shares
            .insert(name.to_string(), Arc::new(share));
        self
    }

    /// Make share enumeration on `addr` fail with `kind`.
    pub fn refuse_listing(mut self, addr: IpAddr, kind: ProtocolErrorKind) -> Self {
        self.hosts.entry(addr).or_default().list_error = Some(kind);
        self
    }

    /// Delay every directory listing by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn counters(&self) -> Arc<SessionCounters> {
        self.counters.clone()
    }
}

#[async_trait]
impl ShareTransport for MemoryTransport {
    async fn list_shares(&self, addr: IpAddr) -> Result<Vec<String>, ProtocolError> {
        let host = self
            .hosts
            .get(&addr)
            .ok_or_else(|| ProtocolError::timeout(format!("no route to {addr}")))?;
        if let Some(kind) = &host.list_error {
            return Err(ProtocolError::new(kind.clone(), format!("listing shares on {addr}")));
        }
        Ok(host.shares.keys().cloned().collect())
    }

    async fn connect(&self, addr: IpAddr, share: &str) -> Result<Box<dyn ShareSession>, ProtocolError> {
        let tree = self
            .hosts
            .get(&addr)
            .and_then(|host| host.shares.get(share))
            .ok_or_else(|| ProtocolError::new(ProtocolErrorKind::ShareNotFound, format!("\\\\{addr}\\{share}")))?;
        if let Some(kind) = &tree.connect_error {
            return Err(ProtocolError::new(kind.clone(), format!("\\\\{addr}\\{share}")));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            tree: tree.clone(),
            latency: self.latency,
            counters: self.counters.clone(),
        }))
    }
}

struct MemorySession {
    tree: Arc<MemoryShare>,
    latency: Option<Duration>,
    counters: Arc<SessionCounters>,
}

#[async_trait]
impl ShareSession for MemorySession {
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ProtocolError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.counters.listings.fetch_add(1, Ordering::SeqCst);

        match self.tree.listings.get(path) {
            Some(Ok(entries)) => Ok(entries.clone()),
            Some(Err(kind)) => Err(ProtocolError::new(kind.clone(), format!("listing {path}*"))),
            None => Err(ProtocolError::new(ProtocolErrorKind::ShareNotFound, format!("no such directory {path}"))),
        }
    }

    async fn close(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}
