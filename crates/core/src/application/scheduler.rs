//! Scheduler - Decides when to attempt a pull
//!
//! Two sources of triggers:
//! - a periodic tick (first one immediate), for the lifetime of the subscription
//! - zero-delay retriggers, sent by workers after every consume task
//!
//! The scheduler performs no I/O itself. Each trigger runs as its own task, and at most
//! `parallelism` of them run at once.

use crate::application::worker::ShutdownToken;
use crate::error::{ConsumerError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

/// Why a trigger fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Tick,
    Retrigger,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Tick => write!(f, "tick"),
            TriggerReason::Retrigger => write!(f, "retrigger"),
        }
    }
}

/// Whatever the scheduler drives
#[async_trait]
pub trait PullTrigger: Send + Sync {
    async fn fire(&self, reason: TriggerReason);
}

/// Cloneable handle asking the scheduler for an immediate extra trigger
///
/// Requests after shutdown are dropped.
#[derive(Clone, Debug)]
pub struct RetriggerHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl RetriggerHandle {
    pub fn retrigger(&self) {
        let _ = self.tx.send(());
    }

    /// Handle not attached to any scheduler; the receiver sees every request
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Periodic + on-demand trigger source
pub struct Scheduler {
    name: String,
    interval: Duration,
    parallelism: Arc<Semaphore>,
    retrigger: RetriggerHandle,
    retrigger_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    shutdown: ShutdownToken,
}

impl Scheduler {
    /// Create a new scheduler
    ///
    /// # Arguments
    /// * `name` - Used in logs
    /// * `interval` - Periodic trigger interval
    /// * `parallelism` - Most triggers running at once (at least 1)
    /// * `shutdown` - Ends the trigger loop
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        parallelism: usize,
        shutdown: ShutdownToken,
    ) -> Self {
        let (retrigger, rx) = RetriggerHandle::detached();
        Self {
            name: name.into(),
            interval,
            parallelism: Arc::new(Semaphore::new(parallelism.max(1))),
            retrigger,
            retrigger_rx: Mutex::new(Some(rx)),
            shutdown,
        }
    }

    pub fn retrigger_handle(&self) -> RetriggerHandle {
        self.retrigger.clone()
    }

    /// Start the trigger loop (must run inside a tokio runtime)
    ///
    /// # Errors
    /// - ConsumerError::InvalidState if already started
    pub fn start(&self, trigger: Arc<dyn PullTrigger>) -> Result<JoinHandle<()>> {
        let rx = self
            .retrigger_rx
            .lock()
            .map_err(|_| ConsumerError::InvalidState("scheduler lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| {
                ConsumerError::InvalidState(format!("scheduler {} already started", self.name))
            })?;

        let run = TriggerLoop {
            name: self.name.clone(),
            interval: self.interval,
            parallelism: Arc::clone(&self.parallelism),
            shutdown: self.shutdown.clone(),
            trigger,
        };

        info!(
            scheduler = %self.name,
            interval_ms = self.interval.as_millis() as u64,
            "Scheduler started"
        );
        Ok(tokio::spawn(run.run(rx)))
    }
}

struct TriggerLoop {
    name: String,
    interval: Duration,
    parallelism: Arc<Semaphore>,
    shutdown: ShutdownToken,
    trigger: Arc<dyn PullTrigger>,
}

impl TriggerLoop {
    async fn run(mut self, mut retriggers: mpsc::UnboundedReceiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let reason = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                _ = ticker.tick() => TriggerReason::Tick,
                Some(()) = retriggers.recv() => TriggerReason::Retrigger,
            };

            trace!(scheduler = %self.name, %reason, "Trigger");
            let permits = Arc::clone(&self.parallelism);
            let trigger = Arc::clone(&self.trigger);
            tokio::spawn(async move {
                // Closed semaphore means the scheduler stopped while we waited
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                trigger.fire(reason).await;
            });
        }

        self.parallelism.close();
        retriggers.close();
        debug!(scheduler = %self.name, "Scheduler stopped");
    }
}
