//! Consumer configuration
//!
//! `ConsumerConfig` carries the knobs read once at construction. Admission thresholds
//! and the pull interval are constants, see [`crate::application::constants`].

use crate::application::constants::*;
use crate::error::{ConsumerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by every subscription of a consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Parallelism of pull triggers
    pub scheduler_threads: usize,

    /// Consume workers kept alive for the whole subscription
    pub worker_core: usize,

    /// Upper bound on consume workers
    pub worker_max: usize,

    /// Idle time before a worker above `worker_core` exits
    pub worker_keep_alive: Duration,

    /// Network deadline of a request, excluding the long poll
    pub request_timeout: Duration,

    /// How long the broker may hold a receive open waiting for messages
    pub polling_wait_seconds: u64,

    /// Messages asked for per receive (1..=16)
    pub batch_size: usize,
}

impl ConsumerConfig {
    pub fn new() -> Self {
        Self {
            scheduler_threads: DEFAULT_SCHEDULER_THREADS,
            worker_core: DEFAULT_WORKER_CORE,
            worker_max: DEFAULT_WORKER_MAX,
            worker_keep_alive: DEFAULT_WORKER_KEEP_ALIVE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            polling_wait_seconds: DEFAULT_POLLING_WAIT_SECONDS,
            batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Set the scheduler parallelism
    pub fn with_scheduler_threads(mut self, threads: usize) -> Self {
        self.scheduler_threads = threads;
        self
    }

    /// Set core and max worker counts
    pub fn with_workers(mut self, core: usize, max: usize) -> Self {
        self.worker_core = core;
        self.worker_max = max;
        self
    }

    /// Set the idle keep-alive of extra workers
    pub fn with_worker_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.worker_keep_alive = keep_alive;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the long-poll wait in seconds
    pub fn with_polling_wait_seconds(mut self, seconds: u64) -> Self {
        self.polling_wait_seconds = seconds;
        self
    }

    /// Set the receive batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Deadline for one receive call: request timeout plus the long poll
    pub fn receive_timeout(&self) -> Duration {
        self.request_timeout + Duration::from_secs(self.polling_wait_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler_threads == 0 {
            return Err(ConsumerError::Config(
                "scheduler_threads must be at least 1".to_string(),
            ));
        }
        if self.worker_core == 0 {
            return Err(ConsumerError::Config(
                "worker_core must be at least 1".to_string(),
            ));
        }
        if self.worker_max < self.worker_core {
            return Err(ConsumerError::Config(format!(
                "worker_max ({}) must not be below worker_core ({})",
                self.worker_max, self.worker_core
            )));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConsumerError::Config(format!(
                "batch_size must be between 1 and {} (got {})",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConsumerError::Config(
                "request_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults_are_valid() {
        let config = ConsumerConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.batch_size, 16);
    }

    #[test]
    fn test_receive_timeout_adds_polling_wait() {
        let config = ConsumerConfig::new()
            .with_request_timeout(Duration::from_millis(3000))
            .with_polling_wait_seconds(10);

        assert_eq!(config.receive_timeout(), Duration::from_millis(13_000));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ConsumerConfig::new()
            .with_scheduler_threads(2)
            .with_workers(2, 6)
            .with_worker_keep_alive(Duration::from_secs(5))
            .with_batch_size(8);

        assert_eq!(config.scheduler_threads, 2);
        assert_eq!(config.worker_core, 2);
        assert_eq!(config.worker_max, 6);
        assert_eq!(config.worker_keep_alive, Duration::from_secs(5));
        assert_eq!(config.batch_size, 8);
    }

    #[test]
    fn test_invalid_configs() {
        assert_err!(ConsumerConfig::new().with_scheduler_threads(0).validate());
        assert_err!(ConsumerConfig::new().with_workers(0, 4).validate());
        assert_err!(ConsumerConfig::new().with_workers(4, 2).validate());
        assert_err!(ConsumerConfig::new().with_batch_size(17).validate());
        assert_err!(ConsumerConfig::new()
            .with_request_timeout(Duration::ZERO)
            .validate());
    }
}
