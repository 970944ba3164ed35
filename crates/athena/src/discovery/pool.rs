//! Bounded worker pools
//!
//! Each kind of network work (probe, resolve, enumerate, index) gets its own
//! pool so a slow class of work can't starve the others.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

/// A named concurrency limit. Cheap to clone; clones share permits.
#[derive(Debug, Clone)]
pub struct WorkPool {
    name: &'static str,
    semaphore: Arc<Semaphore>,
}

impl WorkPool {
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Run `fut` once a slot is free, holding the slot until it completes.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        if self.available() == 0 {
            trace!(pool = self.name, "Pool saturated, waiting for a slot");
        }
        // The semaphore is never closed, so acquisition only waits
        let _permit = self.semaphore.acquire().await.ok();
        fut.await
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
