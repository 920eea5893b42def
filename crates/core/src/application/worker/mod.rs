// Worker Pool - Consume task execution

mod consume;
mod panic_guard;
mod shutdown;

pub use consume::ConsumeExecutor;
pub use panic_guard::{execute_guarded_async, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::admission::QueueDepth;
use crate::error::{ConsumerError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace};

/// Something a worker knows how to run
#[async_trait]
pub trait TaskHandler<T>: Send + Sync {
    async fn handle(&self, task: T);
}

/// Worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers alive for the whole pool lifetime
    pub core: usize,
    /// Upper bound on live workers
    pub max: usize,
    /// Idle time after which a worker above `core` exits
    pub keep_alive: Duration,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub live_workers: usize,
    pub active_workers: usize,
    pub queue_depth: usize,
}

/// Bounded pool of workers draining an unbounded task queue
///
/// Storage is unbounded; the queue is kept short by admission reading `QueueDepth`.
/// Core workers run until shutdown. When every live worker is busy and tasks are
/// waiting, extra workers are spawned up to `max`; they exit after `keep_alive` idle.
pub struct WorkerPool<T> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    name: String,
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
    handler: Arc<dyn TaskHandler<T>>,
    config: PoolConfig,
    depth: QueueDepth,
    live: AtomicUsize,
    busy: AtomicUsize,
    accepting: AtomicBool,
    started: AtomicBool,
    next_worker_id: AtomicUsize,
    shutdown: ShutdownToken,
}

enum Next<T> {
    Task(T),
    Idle,
    Shutdown,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool; no worker runs until [`WorkerPool::start`]
    ///
    /// # Arguments
    /// * `name` - Pool name, used in logs and worker names
    /// * `config` - Core/max sizing and keep-alive
    /// * `depth` - Depth gauge this pool maintains
    /// * `handler` - What each worker does with a task
    /// * `shutdown` - Stops acceptance and lets workers exit
    pub fn new(
        name: impl Into<String>,
        config: PoolConfig,
        depth: QueueDepth,
        handler: Arc<dyn TaskHandler<T>>,
        shutdown: ShutdownToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                tx,
                rx: Mutex::new(rx),
                handler,
                config,
                depth,
                live: AtomicUsize::new(0),
                busy: AtomicUsize::new(0),
                accepting: AtomicBool::new(true),
                started: AtomicBool::new(false),
                next_worker_id: AtomicUsize::new(0),
                shutdown,
            }),
        }
    }

    /// Spawn the core workers (must run inside a tokio runtime)
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::AcqRel) {
            return Err(ConsumerError::InvalidState(format!(
                "worker pool {} already started",
                inner.name
            )));
        }
        for _ in 0..inner.config.core {
            inner.live.fetch_add(1, Ordering::AcqRel);
            inner.spawn_worker(false);
        }
        info!(
            pool = %inner.name,
            core = inner.config.core,
            max = inner.config.max,
            "Worker pool started"
        );
        Ok(())
    }

    /// Queue a task for the next free worker
    ///
    /// # Errors
    /// - ConsumerError::PoolClosed after shutdown
    pub fn submit(&self, task: T) -> Result<()> {
        let inner = &self.inner;
        if !inner.accepting.load(Ordering::Acquire) || inner.shutdown.is_shutdown() {
            return Err(ConsumerError::PoolClosed(inner.name.clone()));
        }

        inner.depth.increment();
        if inner.tx.send(task).is_err() {
            inner.depth.decrement();
            return Err(ConsumerError::PoolClosed(inner.name.clone()));
        }

        inner.maybe_grow();
        Ok(())
    }

    /// Stop accepting tasks; queued tasks still run
    pub fn stop_accepting(&self) {
        self.inner.accepting.store(false, Ordering::Release);
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire) && !self.inner.shutdown.is_shutdown()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live_workers: self.inner.live.load(Ordering::Acquire),
            active_workers: self.inner.busy.load(Ordering::Acquire),
            queue_depth: self.inner.depth.get(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<T: Send + 'static> PoolInner<T> {
    /// Add a worker if tasks are waiting, everyone is busy and there is room
    ///
    /// Checked on submit and whenever a worker takes a task, so a burst queued
    /// before any worker was busy still grows the pool.
    fn maybe_grow(self: &Arc<Self>) {
        if !self.started.load(Ordering::Acquire) || self.shutdown.is_shutdown() {
            return;
        }

        let mut live = self.live.load(Ordering::Acquire);
        loop {
            let busy = self.busy.load(Ordering::Acquire);
            if live >= self.config.max || busy < live || self.depth.get() == 0 {
                return;
            }
            match self
                .live
                .compare_exchange(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => live = actual,
            }
        }

        debug!(pool = %self.name, live = live + 1, "Growing worker pool");
        self.spawn_worker(true);
    }

    fn spawn_worker(self: &Arc<Self>, elastic: bool) {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker_name = format!("{}-{}", self.name, id);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_worker(worker_name, elastic).await;
        });
    }

    async fn run_worker(self: Arc<Self>, name: String, elastic: bool) {
        trace!(worker = %name, elastic, "Worker started");
        let mut shutdown = self.shutdown.clone();

        loop {
            match self.next_task(&mut shutdown, elastic).await {
                Next::Task(task) => self.run_task(task).await,
                Next::Idle => {
                    debug!(worker = %name, "Idle worker above core size exiting");
                    break;
                }
                Next::Shutdown => {
                    // Finish whatever was queued before the shutdown
                    while let Some(task) = self.try_next_task().await {
                        self.run_task(task).await;
                    }
                    break;
                }
            }
        }

        self.live.fetch_sub(1, Ordering::AcqRel);
        trace!(worker = %name, "Worker stopped");
    }

    async fn next_task(&self, shutdown: &mut ShutdownToken, elastic: bool) -> Next<T> {
        if shutdown.is_shutdown() {
            return Next::Shutdown;
        }

        let recv = async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        };

        tokio::select! {
            task = recv => match task {
                Some(task) => Next::Task(task),
                None => Next::Shutdown,
            },
            _ = shutdown.wait() => Next::Shutdown,
            _ = tokio::time::sleep(self.config.keep_alive), if elastic => Next::Idle,
        }
    }

    async fn try_next_task(&self) -> Option<T> {
        self.rx.lock().await.try_recv().ok()
    }

    async fn run_task(self: &Arc<Self>, task: T) {
        self.depth.decrement();
        self.busy.fetch_add(1, Ordering::AcqRel);
        self.maybe_grow();
        self.handler.handle(task).await;
        self.busy.fetch_sub(1, Ordering::AcqRel);
    }
}
