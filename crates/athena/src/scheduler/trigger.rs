//! Time-based triggers feeding the phase queue

use super::{Phase, PhaseExecutor, PhaseQueue, QueueHandle};
use crate::config::ScheduleConfig;
use crate::error::{AthenaError, Result};
use athena_db::Repository;
use chrono::{DateTime, Local};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Parse a cron expression in local time.
///
/// Standard 5-field expressions get a leading seconds field of `0`; 6 and 7
/// field expressions are taken as-is.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let fields = expr.split_whitespace().count();
    let normalized = match fields {
        5 => format!("0 {}", expr.trim()),
        6 | 7 => expr.trim().to_string(),
        _ => {
            return Err(AthenaError::config(format!(
                "cron expression '{expr}' has {fields} fields, expected 5 to 7"
            )))
        }
    };
    Schedule::from_str(&normalized).map_err(|e| AthenaError::config(format!("cron expression '{expr}': {e}")))
}

/// Enqueues a fixed phase sequence each time its schedule fires.
pub struct CronTrigger {
    name: &'static str,
    schedule: Schedule,
    phases: Vec<Phase>,
}

impl CronTrigger {
    pub fn new(name: &'static str, expr: &str, phases: &[Phase]) -> Result<Self> {
        Ok(Self {
            name,
            schedule: parse_cron(expr)?,
            phases: phases.to_vec(),
        })
    }

    pub fn next_fire(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(&after).next()
    }

    /// Loop until the queue shuts down or the schedule runs out.
    pub fn spawn(self, queue: QueueHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Local::now();
                let Some(next) = self.next_fire(now) else {
                    warn!(trigger = self.name, "Schedule has no future occurrences");
                    break;
                };
                debug!(trigger = self.name, next = %next, "Trigger armed");
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                if !enqueue_logged(&queue, self.name, &self.phases) {
                    break;
                }
            }
        })
    }
}

/// Enqueue `phases` once after `delay`.
pub fn spawn_delayed(name: &'static str, delay: Duration, phases: &[Phase], queue: QueueHandle) -> JoinHandle<()> {
    let phases = phases.to_vec();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        enqueue_logged(&queue, name, &phases);
    })
}

fn enqueue_logged(queue: &QueueHandle, trigger: &str, phases: &[Phase]) -> bool {
    match queue.enqueue_all(phases) {
        Ok(_) => {
            info!(trigger, phases = phases.len(), pending = queue.pending(), "Trigger fired");
            true
        }
        Err(e) => {
            debug!(trigger, error = %e, "Trigger stopped");
            false
        }
    }
}

/// The phase queue plus the triggers that feed it.
pub struct Scheduler {
    queue: PhaseQueue,
    triggers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Start the queue and arm the discovery, ping and startup triggers.
    ///
    /// Invalid cron expressions fail here, before anything is spawned.
    pub fn start(config: &ScheduleConfig, executor: Arc<dyn PhaseExecutor>, repo: Arc<dyn Repository>) -> Result<Self> {
        let discover = CronTrigger::new("discover", &config.discover_cron, &Phase::FULL_DISCOVERY)?;
        let ping = CronTrigger::new("ping", &config.ping_cron, &[Phase::PingKnownHosts])?;

        let queue = PhaseQueue::start(executor, repo);
        let mut triggers = vec![discover.spawn(queue.handle()), ping.spawn(queue.handle())];
        if let Some(delay) = config.initial_delay() {
            info!(delay_secs = delay.as_secs(), "Initial full discovery scheduled");
            triggers.push(spawn_delayed("startup", delay, &Phase::FULL_DISCOVERY, queue.handle()));
        }

        Ok(Self { queue, triggers })
    }

    pub fn handle(&self) -> QueueHandle {
        self.queue.handle()
    }

    /// Stop all triggers, then let the running phase finish.
    pub async fn shutdown(self) {
        for trigger in &self.triggers {
            trigger.abort();
        }
        self.queue.shutdown().await;
    }
}
