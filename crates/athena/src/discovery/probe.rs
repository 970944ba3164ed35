//! TCP liveness probe

use super::pool::WorkPool;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub port: u16,
    pub timeout: Duration,
    pub attempts: u32,
}

/// Try to open a TCP connection to `addr:port` up to `attempts` times.
///
/// Online if any attempt connects within `timeout`. Every failure mode
/// (refused, unreachable, timed out) reads as offline.
pub async fn probe(addr: IpAddr, settings: ProbeSettings) -> bool {
    let target = SocketAddr::new(addr, settings.port);

    for attempt in 1..=settings.attempts.max(1) {
        match tokio::time::timeout(settings.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => return true,
            Ok(Err(e)) => trace!(%target, attempt, error = %e, "Probe failed"),
            Err(_) => trace!(%target, attempt, "Probe timed out"),
        }
    }
    false
}

/// Probes addresses through the probe pool.
#[derive(Debug, Clone)]
pub struct Prober {
    pool: WorkPool,
    settings: ProbeSettings,
}

impl Prober {
    pub fn new(pool: WorkPool, settings: ProbeSettings) -> Self {
        Self { pool, settings }
    }

    pub async fn is_online(&self, addr: IpAddr) -> bool {
        self.pool.run(probe(addr, self.settings)).await
    }

    /// Probe every address concurrently; one outcome per input, in input order.
    pub async fn probe_all(&self, addrs: &[IpAddr]) -> Vec<(IpAddr, bool)> {
        let mut outcomes = vec![false; addrs.len()];
        let mut tasks = JoinSet::new();

        for (index, addr) in addrs.iter().copied().enumerate() {
            let prober = self.clone();
            tasks.spawn(async move { (index, prober.is_online(addr).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            // A panicked probe leaves its slot offline
            if let Ok((index, online)) = joined {
                outcomes[index] = online;
            }
        }

        addrs.iter().copied().zip(outcomes).collect()
    }
}
