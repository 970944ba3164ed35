//! Host discovery: probe, resolve, enumerate, persist

use super::Pipeline;
use crate::discovery::range;
use crate::error::Result;
use std::net::IpAddr;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub candidates: usize,
    pub online: usize,
    pub resolved: usize,
    pub recorded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostOutcome {
    Offline,
    Unresolved { online: bool },
    NoShares { online: bool },
    Recorded { online: bool },
    Failed { online: bool },
}

impl Pipeline {
    /// Sweep the configured range and persist every qualifying host.
    ///
    /// With `minimize` on, a host must answer the probe, resolve to a name
    /// and expose at least one share. With it off, the probe doesn't gate
    /// and shareless hosts are kept if they answered the probe. A name is
    /// always required.
    pub async fn discover_new_hosts(&self) -> Result<DiscoverySummary> {
        let addresses = range::expand(&self.range)?;
        info!(range = %self.range, candidates = addresses.len(), "Discovering hosts");

        let mut tasks = JoinSet::new();
        for addr in addresses.iter().copied() {
            let pipeline = self.clone();
            tasks.spawn(async move { pipeline.discover_host(IpAddr::V4(addr)).await });
        }

        let mut summary = DiscoverySummary {
            candidates: addresses.len(),
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Discovery task failed");
                    summary.failed += 1;
                    continue;
                }
            };
            let online = match outcome {
                HostOutcome::Offline => false,
                HostOutcome::Unresolved { online } => online,
                HostOutcome::NoShares { online } | HostOutcome::Recorded { online } | HostOutcome::Failed { online } => {
                    summary.resolved += 1;
                    online
                }
            };
            if online {
                summary.online += 1;
            }
            match outcome {
                HostOutcome::Recorded { .. } => summary.recorded += 1,
                HostOutcome::Failed { .. } => summary.failed += 1,
                _ => {}
            }
        }

        info!(
            candidates = summary.candidates,
            online = summary.online,
            resolved = summary.resolved,
            recorded = summary.recorded,
            failed = summary.failed,
            "Discovery complete"
        );
        Ok(summary)
    }

    async fn discover_host(&self, addr: IpAddr) -> HostOutcome {
        let online = self.prober.is_online(addr).await;
        if !online && self.minimize {
            return HostOutcome::Offline;
        }

        let Some(hostname) = self.resolver.resolve(addr).await else {
            debug!(%addr, "No reverse name, skipping");
            return HostOutcome::Unresolved { online };
        };

        let shares = self.enumerator.list_shares(addr).await;
        if shares.is_empty() && (self.minimize || !online) {
            debug!(%addr, %hostname, "No shares, skipping");
            return HostOutcome::NoShares { online };
        }

        match self.record_host(addr, &hostname, &shares).await {
            Ok(()) => {
                debug!(%addr, %hostname, shares = shares.len(), "Host recorded");
                HostOutcome::Recorded { online }
            }
            Err(e) => {
                warn!(%addr, %hostname, error = %e, "Failed to record host");
                HostOutcome::Failed { online }
            }
        }
    }

    async fn record_host(&self, addr: IpAddr, hostname: &str, shares: &[String]) -> athena_db::Result<()> {
        let host_id = self.repo.upsert_host(&addr.to_string(), hostname).await?;
        for share in shares {
            self.repo.upsert_share(host_id, share).await?;
        }
        Ok(())
    }
}
