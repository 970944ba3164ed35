//! Liveness sweep over known hosts

use super::Pipeline;
use crate::error::Result;
use chrono::Utc;
use std::net::IpAddr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingSummary {
    pub known: usize,
    pub online: usize,
}

impl Pipeline {
    /// Probe every known host and refresh `last_seen` on those that answer.
    ///
    /// Hosts that stay silent are left untouched; nothing is ever removed.
    pub async fn ping_known_hosts(&self) -> Result<PingSummary> {
        let hosts = self.repo.list_hosts().await?;
        info!(hosts = hosts.len(), "Pinging known hosts");

        let mut targets = Vec::with_capacity(hosts.len());
        for host in &hosts {
            match host.ip.parse::<IpAddr>() {
                Ok(addr) => targets.push((addr, host.id)),
                Err(_) => warn!(host = %host.hostname, ip = %host.ip, "Stored address is invalid, skipping"),
            }
        }

        let addrs: Vec<IpAddr> = targets.iter().map(|(addr, _)| *addr).collect();
        let outcomes = self.prober.probe_all(&addrs).await;

        let mut summary = PingSummary {
            known: hosts.len(),
            online: 0,
        };
        let seen_at = Utc::now();
        for ((_, online), (_, host_id)) in outcomes.into_iter().zip(&targets) {
            if !online {
                continue;
            }
            summary.online += 1;
            if let Err(e) = self.repo.update_last_seen(*host_id, seen_at).await {
                warn!(host_id = *host_id, error = %e, "Failed to update last seen");
            }
        }

        info!(known = summary.known, online = summary.online, "Ping sweep complete");
        Ok(summary)
    }
}
