//! Reverse name resolution

use super::pool::WorkPool;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Source of reverse (address to name) lookups.
#[async_trait]
pub trait NameService: Send + Sync {
    /// First name the address maps to, if any
    async fn reverse(&self, addr: IpAddr) -> Option<String>;
}

/// The system resolver (`getnameinfo`), run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNameService;

#[async_trait]
impl NameService for SystemNameService {
    async fn reverse(&self, addr: IpAddr) -> Option<String> {
        match tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr)).await {
            Ok(Ok(name)) => Some(name),
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "Reverse lookup failed");
                None
            }
            Err(e) => {
                debug!(%addr, error = %e, "Reverse lookup task failed");
                None
            }
        }
    }
}

/// Resolves addresses through the resolve pool and case-folds the result.
#[derive(Clone)]
pub struct Resolver {
    pool: WorkPool,
    service: Arc<dyn NameService>,
}

impl Resolver {
    pub fn new(pool: WorkPool, service: Arc<dyn NameService>) -> Self {
        Self { pool, service }
    }

    pub async fn resolve(&self, addr: IpAddr) -> Option<String> {
        let name = self.pool.run(self.service.reverse(addr)).await?;
        normalize_hostname(&name)
    }
}

/// Lowercase a looked-up name and drop the trailing root dot.
///
/// Resolvers that fall back to the numeric form return the address itself;
/// that counts as no name.
pub fn normalize_hostname(name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(name.to_lowercase())
}
