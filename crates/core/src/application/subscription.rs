//! Subscription - the consume engine for one (queue, listener) pair
//!
//! Wiring:
//! ```text
//! Scheduler --fire--> PullDispatcher --admit--> AdmissionController
//!                          |
//!                          v (async completion)
//!                    WorkerPool<ConsumeTask> --> ConsumeExecutor --> AckDispatcher
//!                          |                          |
//!                          +---- QueueDepth ----------+--> RetriggerHandle --> Scheduler
//! ```

use crate::application::ack::AckDispatcher;
use crate::application::admission::{AdmissionController, QueueDepth};
use crate::application::config::ConsumerConfig;
use crate::application::constants::{MAX_FLIGHT, MAX_QUEUE_DEPTH, PULL_INTERVAL};
use crate::application::dispatcher::{PullDispatcher, PullOutcome};
use crate::application::scheduler::Scheduler;
use crate::application::worker::{
    shutdown_channel, ConsumeExecutor, PoolConfig, ShutdownSender, WorkerPool,
};
use crate::domain::{ConsumeTask, PullRequestTemplate, QueueName};
use crate::error::{ConsumerError, Result};
use crate::port::{
    AtomicSequence, FailureReporter, MessageListener, Router, SequenceProvider,
    TracingFailureReporter, Transport,
};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Collaborators shared by every subscription of a consumer
#[derive(Clone)]
pub struct ConsumerPorts {
    pub router: Arc<dyn Router>,
    pub transport: Arc<dyn Transport>,
    pub reporter: Arc<dyn FailureReporter>,
    pub sequence: Arc<dyn SequenceProvider>,
}

impl ConsumerPorts {
    /// Ports with the default reporter (tracing) and a fresh sequence
    pub fn new(router: Arc<dyn Router>, transport: Arc<dyn Transport>) -> Self {
        Self {
            router,
            transport,
            reporter: Arc::new(TracingFailureReporter),
            sequence: Arc::new(AtomicSequence::new()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn FailureReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_sequence(mut self, sequence: Arc<dyn SequenceProvider>) -> Self {
        self.sequence = sequence;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Created => write!(f, "created"),
            SubscriptionState::Running => write!(f, "running"),
            SubscriptionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time view of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub queue: QueueName,
    pub state: SubscriptionState,
    pub in_flight: usize,
    pub queue_depth: usize,
    pub live_workers: usize,
    pub active_workers: usize,
}

pub struct Subscription {
    queue: QueueName,
    admission: Arc<AdmissionController>,
    scheduler: Scheduler,
    dispatcher: Arc<PullDispatcher>,
    pool: Arc<WorkerPool<ConsumeTask>>,
    shutdown: ShutdownSender,
    state: Mutex<SubscriptionState>,
}

impl Subscription {
    /// Build the engine; nothing runs until [`Subscription::start`]
    ///
    /// # Errors
    /// - ConsumerError::Config if `config` is invalid
    pub fn new(
        queue: QueueName,
        listener: Arc<dyn MessageListener>,
        ports: &ConsumerPorts,
        config: &ConsumerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let template =
            PullRequestTemplate::new(queue.clone(), config.batch_size, config.polling_wait_seconds)?;

        let depth = QueueDepth::new();
        let admission = Arc::new(AdmissionController::new(
            MAX_FLIGHT,
            MAX_QUEUE_DEPTH,
            depth.clone(),
        ));
        let (shutdown, token) = shutdown_channel();

        let scheduler = Scheduler::new(
            format!("{}-pull", queue),
            PULL_INTERVAL,
            config.scheduler_threads,
            token.clone(),
        );

        let acks = AckDispatcher::new(
            Arc::clone(&ports.router),
            Arc::clone(&ports.transport),
            Arc::clone(&ports.reporter),
        );
        let executor = ConsumeExecutor::new(
            listener,
            acks,
            scheduler.retrigger_handle(),
            Arc::clone(&ports.reporter),
        );
        let pool = Arc::new(WorkerPool::new(
            format!("{}-consume", queue),
            PoolConfig {
                core: config.worker_core,
                max: config.worker_max,
                keep_alive: config.worker_keep_alive,
            },
            depth,
            Arc::new(executor),
            token,
        ));

        let dispatcher = Arc::new(PullDispatcher::new(
            template,
            config.receive_timeout(),
            Arc::clone(&admission),
            Arc::clone(&ports.router),
            Arc::clone(&ports.transport),
            Arc::clone(&ports.sequence),
            Arc::clone(&pool),
            Arc::clone(&ports.reporter),
        ));

        Ok(Self {
            queue,
            admission,
            scheduler,
            dispatcher,
            pool,
            shutdown,
            state: Mutex::new(SubscriptionState::Created),
        })
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn state(&self) -> SubscriptionState {
        *self.lock_state()
    }

    /// Start the workers and the pull scheduler
    ///
    /// # Errors
    /// - ConsumerError::NoRuntime outside a tokio runtime
    /// - ConsumerError::InvalidState if already started or shut down
    pub fn start(&self) -> Result<()> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| ConsumerError::NoRuntime(e.to_string()))?;

        let mut state = self.lock_state();
        if *state != SubscriptionState::Created {
            return Err(ConsumerError::InvalidState(format!(
                "subscription {} is {}",
                self.queue, *state
            )));
        }

        self.pool.start()?;
        self.scheduler.start(self.dispatcher.clone())?;
        *state = SubscriptionState::Running;

        info!(queue = %self.queue, "Subscription started");
        Ok(())
    }

    /// Stop pulling: ends the scheduler, closes admission, stops the pool accepting
    ///
    /// Receives and deletes already submitted may still complete. Calling it again
    /// does nothing.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        if *state == SubscriptionState::Stopped {
            return;
        }
        *state = SubscriptionState::Stopped;

        self.shutdown.shutdown();
        self.admission.close();
        self.pool.stop_accepting();

        info!(queue = %self.queue, "Subscription shut down");
    }

    /// Run one pull attempt now, outside the scheduler
    pub async fn pull_now(&self) -> PullOutcome {
        self.dispatcher.try_pull().await
    }

    pub fn stats(&self) -> SubscriptionStats {
        let pool = self.pool.stats();
        SubscriptionStats {
            queue: self.queue.clone(),
            state: self.state(),
            in_flight: self.admission.in_flight(),
            queue_depth: pool.queue_depth,
            live_workers: pool.live_workers,
            active_workers: pool.active_workers,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
