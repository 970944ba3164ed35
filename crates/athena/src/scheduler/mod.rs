//! Phase scheduling
//!
//! All phases run through one [`PhaseQueue`]: a single runner task executes
//! them strictly one at a time in enqueue order. Cron and startup triggers
//! (see [`trigger`]) only ever enqueue. Every run, failed or not, is recorded
//! as a scan once it finishes.

pub mod trigger;

use crate::error::{AthenaError, Result};
use async_trait::async_trait;
use athena_db::Repository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use trigger::{CronTrigger, Scheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DiscoverNewHosts,
    PingKnownHosts,
    IndexKnownHosts,
    PostProcessing,
}

impl Phase {
    /// The sequence a full discovery enqueues
    pub const FULL_DISCOVERY: [Phase; 3] = [Phase::DiscoverNewHosts, Phase::IndexKnownHosts, Phase::PostProcessing];

    /// Name recorded in scan records
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DiscoverNewHosts => "discover_new_hosts",
            Phase::PingKnownHosts => "ping_known_hosts",
            Phase::IndexKnownHosts => "index_known_hosts",
            Phase::PostProcessing => "post_processing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the body of a phase.
#[async_trait]
pub trait PhaseExecutor: Send + Sync + 'static {
    async fn execute(&self, phase: Phase) -> Result<()>;
}

/// How one queued phase ended
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub runtime_ms: u64,
    pub error: Option<String>,
}

impl PhaseOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct QueuedPhase {
    phase: Phase,
    done: oneshot::Sender<PhaseOutcome>,
}

/// Cloneable enqueue side of a [`PhaseQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<QueuedPhase>,
    pending: Arc<AtomicUsize>,
}

impl QueueHandle {
    /// Queue `phase`; the receiver resolves once it has run.
    pub fn enqueue(&self, phase: Phase) -> Result<oneshot::Receiver<PhaseOutcome>> {
        let (done, outcome) = oneshot::channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(QueuedPhase { phase, done }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(AthenaError::scheduler("phase queue is shut down"));
        }
        Ok(outcome)
    }

    /// Queue several phases back to back, in order.
    pub fn enqueue_all(&self, phases: &[Phase]) -> Result<Vec<oneshot::Receiver<PhaseOutcome>>> {
        phases.iter().map(|phase| self.enqueue(*phase)).collect()
    }

    /// Phases queued but not yet started
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

pub struct PhaseQueue {
    handle: QueueHandle,
    shutdown: Option<oneshot::Sender<()>>,
    runner: Option<JoinHandle<()>>,
}

impl PhaseQueue {
    /// Spawn the runner task.
    pub fn start(executor: Arc<dyn PhaseExecutor>, repo: Arc<dyn Repository>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let runner = tokio::spawn(run_queue(rx, shutdown_rx, pending.clone(), executor, repo));

        Self {
            handle: QueueHandle { tx, pending },
            shutdown: Some(shutdown_tx),
            runner: Some(runner),
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn enqueue(&self, phase: Phase) -> Result<oneshot::Receiver<PhaseOutcome>> {
        self.handle.enqueue(phase)
    }

    pub fn enqueue_all(&self, phases: &[Phase]) -> Result<Vec<oneshot::Receiver<PhaseOutcome>>> {
        self.handle.enqueue_all(phases)
    }

    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// Let the running phase finish, drop whatever is still queued, and
    /// wait for the runner to exit.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(runner) = self.runner.take() {
            if let Err(e) = runner.await {
                error!(error = %e, "Phase runner terminated abnormally");
            }
        }
    }
}

async fn run_queue(
    mut rx: mpsc::UnboundedReceiver<QueuedPhase>,
    mut shutdown: oneshot::Receiver<()>,
    pending: Arc<AtomicUsize>,
    executor: Arc<dyn PhaseExecutor>,
    repo: Arc<dyn Repository>,
) {
    info!("Phase runner started");
    loop {
        let queued = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = rx.recv() => match next {
                Some(queued) => queued,
                None => break,
            },
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        let outcome = run_phase(queued.phase, executor.clone(), repo.as_ref()).await;
        // The enqueuer may have stopped waiting
        let _ = queued.done.send(outcome);
    }

    let dropped = pending.swap(0, Ordering::SeqCst);
    info!(dropped, "Phase runner stopped");
}

/// Run one phase to completion and record it as a scan.
///
/// The body runs in its own task so a panic is contained like an error.
async fn run_phase(phase: Phase, executor: Arc<dyn PhaseExecutor>, repo: &dyn Repository) -> PhaseOutcome {
    let started_at = Utc::now();
    let timer = Instant::now();
    info!(%phase, "Phase started");

    let result = match tokio::spawn(async move { executor.execute(phase).await }).await {
        Ok(result) => result,
        Err(e) => Err(AthenaError::Panicked(e.to_string())),
    };
    let runtime_ms = timer.elapsed().as_millis() as u64;

    let error = match result {
        Ok(()) => {
            info!(%phase, runtime_ms, "Phase complete");
            None
        }
        Err(e) => {
            error!(%phase, runtime_ms, error = %e, "Phase failed");
            Some(e.to_string())
        }
    };

    if let Err(e) = repo.append_scan(phase.as_str(), started_at, runtime_ms).await {
        warn!(%phase, error = %e, "Failed to record scan");
    }

    PhaseOutcome {
        phase,
        started_at,
        runtime_ms,
        error,
    }
}
