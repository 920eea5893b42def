// Consumer constants (no magic values)
use std::time::Duration;

pub use crate::domain::MAX_BATCH_SIZE;

/// Most pull attempts that may sit between admission and submission at once
pub const MAX_FLIGHT: usize = 16;

/// Admission stops while this many received batches wait for a worker
pub const MAX_QUEUE_DEPTH: usize = 16;

/// Periodic pull trigger interval (1s)
pub const PULL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default scheduler parallelism
pub const DEFAULT_SCHEDULER_THREADS: usize = 1;

/// Default number of always-alive consume workers
pub const DEFAULT_WORKER_CORE: usize = 4;

/// Default upper bound on consume workers
pub const DEFAULT_WORKER_MAX: usize = 8;

/// Idle time after which a worker above the core count exits (60s)
pub const DEFAULT_WORKER_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Default request timeout, excluding the broker's long poll (3s)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default long-poll wait the broker may hold a receive for
pub const DEFAULT_POLLING_WAIT_SECONDS: u64 = 3;
