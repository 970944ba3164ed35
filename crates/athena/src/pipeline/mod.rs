//! The four scheduled phases
//!
//! [`Pipeline`] owns the discovery components, the indexer and the store,
//! and implements [`PhaseExecutor`] so the scheduler can drive it. Each phase
//! lives in its own module.

mod discover;
mod index;
mod ping;
mod postprocess;

pub use discover::DiscoverySummary;
pub use index::IndexSummary;
pub use ping::PingSummary;
pub use postprocess::keyword_counts;

use crate::config::AthenaConfig;
use crate::discovery::{
    NameService, ProbeSettings, Prober, Resolver, ShareEnumerator, SystemNameService, WorkPool,
};
use crate::error::Result;
use crate::indexer::Indexer;
use crate::scheduler::{Phase, PhaseExecutor};
use crate::smb::smbclient::SmbClientTransport;
use crate::smb::ShareTransport;
use async_trait::async_trait;
use athena_db::Repository;
use std::sync::Arc;

/// Everything a phase needs. Cheap to clone; clones share pools and store.
#[derive(Clone)]
pub struct Pipeline {
    repo: Arc<dyn Repository>,
    prober: Prober,
    resolver: Resolver,
    enumerator: ShareEnumerator,
    indexer: Indexer,
    range: String,
    minimize: bool,
}

impl Pipeline {
    /// Build a pipeline on explicit network backends.
    pub fn new(
        config: &AthenaConfig,
        repo: Arc<dyn Repository>,
        transport: Arc<dyn ShareTransport>,
        names: Arc<dyn NameService>,
    ) -> Self {
        let pools = &config.pools;
        let probe_settings = ProbeSettings {
            port: config.discovery.port,
            timeout: config.discovery.probe_timeout(),
            attempts: config.discovery.probe_attempts,
        };

        Self {
            prober: Prober::new(WorkPool::new("probe", pools.probe), probe_settings),
            resolver: Resolver::new(WorkPool::new("resolve", pools.resolve), names),
            enumerator: ShareEnumerator::new(WorkPool::new("enumerate", pools.enumerate), transport.clone()),
            indexer: Indexer::new(transport, WorkPool::new("index", pools.index), config.smb.batch_size),
            range: config.discovery.range.clone(),
            minimize: config.discovery.minimize,
            repo,
        }
    }

    /// Build a pipeline on `smbclient` and the system resolver.
    pub fn from_config(config: &AthenaConfig, repo: Arc<dyn Repository>) -> Self {
        Self::new(
            config,
            repo,
            Arc::new(SmbClientTransport::new(&config.smb)),
            Arc::new(SystemNameService),
        )
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Run one phase directly, bypassing the queue.
    pub async fn run(&self, phase: Phase) -> Result<()> {
        match phase {
            Phase::DiscoverNewHosts => self.discover_new_hosts().await.map(|_| ()),
            Phase::PingKnownHosts => self.ping_known_hosts().await.map(|_| ()),
            Phase::IndexKnownHosts => self.index_known_hosts().await.map(|_| ()),
            Phase::PostProcessing => self.post_processing().await.map(|_| ()),
        }
    }
}

#[async_trait]
impl PhaseExecutor for Pipeline {
    async fn execute(&self, phase: Phase) -> Result<()> {
        self.run(phase).await
    }
}
