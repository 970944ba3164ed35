//! Share enumeration

use super::pool::WorkPool;
use crate::smb::{filter_admin_shares, ShareTransport};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lists a host's shares through the enumerate pool.
#[derive(Clone)]
pub struct ShareEnumerator {
    pool: WorkPool,
    transport: Arc<dyn ShareTransport>,
}

impl ShareEnumerator {
    pub fn new(pool: WorkPool, transport: Arc<dyn ShareTransport>) -> Self {
        Self { pool, transport }
    }

    /// Non-administrative share names of `addr`.
    ///
    /// Any failure reads as "no shares"; it is logged, never returned.
    pub async fn list_shares(&self, addr: IpAddr) -> Vec<String> {
        match self.pool.run(self.transport.list_shares(addr)).await {
            Ok(names) => filter_admin_shares(names),
            Err(e) if e.is_expected() => {
                debug!(%addr, error = %e, "Share enumeration refused");
                Vec::new()
            }
            Err(e) => {
                warn!(%addr, error = %e, "Share enumeration failed");
                Vec::new()
            }
        }
    }
}
