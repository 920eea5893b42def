//! Command line and environment configuration

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pullq_core::application::constants::{
    DEFAULT_POLLING_WAIT_SECONDS, DEFAULT_SCHEDULER_THREADS, DEFAULT_WORKER_CORE,
    DEFAULT_WORKER_MAX, MAX_BATCH_SIZE,
};
use pullq_core::domain::QueueName;
use pullq_core::ConsumerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Highest accepted `--produce-rate`; keeps the producer tick above zero
const MAX_PRODUCE_RATE: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Production: JSON structured logging
    Json,
    /// Development: human readable
    Pretty,
}

#[derive(Debug, Parser)]
#[command(name = "pullq")]
#[command(about = "Pull-based queue consumer running against an in-process broker cluster")]
#[command(version)]
pub struct Args {
    /// Queues to create and consume, comma separated
    #[arg(long, env = "PULLQ_QUEUES", value_delimiter = ',', default_value = "orders")]
    pub queues: Vec<String>,

    /// Number of broker nodes; all of them front the same queue store
    #[arg(long, env = "PULLQ_BROKERS", default_value_t = 2)]
    pub brokers: usize,

    /// Seconds a received message stays hidden before redelivery
    #[arg(long, env = "PULLQ_VISIBILITY_TIMEOUT_SECS", default_value_t = 30)]
    pub visibility_timeout_secs: u64,

    /// Seconds a cached route is trusted before it is fetched again
    #[arg(long, env = "PULLQ_ROUTE_TTL_SECS", default_value_t = 60)]
    pub route_ttl_secs: u64,

    /// Demo messages produced per second and queue (0 disables the producer)
    #[arg(
        long,
        env = "PULLQ_PRODUCE_RATE",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(0..=MAX_PRODUCE_RATE as i64)
    )]
    pub produce_rate: u32,

    /// Leave every Nth consumed message unacknowledged (0 acknowledges everything)
    #[arg(long, env = "PULLQ_NACK_EVERY", default_value_t = 0)]
    pub nack_every: u64,

    #[arg(long, env = "PULLQ_SCHEDULER_THREADS", default_value_t = DEFAULT_SCHEDULER_THREADS)]
    pub scheduler_threads: usize,

    #[arg(long, env = "PULLQ_WORKER_CORE", default_value_t = DEFAULT_WORKER_CORE)]
    pub worker_core: usize,

    #[arg(long, env = "PULLQ_WORKER_MAX", default_value_t = DEFAULT_WORKER_MAX)]
    pub worker_max: usize,

    #[arg(long, env = "PULLQ_WORKER_KEEP_ALIVE_SECS", default_value_t = 60)]
    pub worker_keep_alive_secs: u64,

    #[arg(long, env = "PULLQ_REQUEST_TIMEOUT_MS", default_value_t = 3000)]
    pub request_timeout_ms: u64,

    #[arg(long, env = "PULLQ_POLLING_WAIT_SECS", default_value_t = DEFAULT_POLLING_WAIT_SECONDS)]
    pub polling_wait_secs: u64,

    #[arg(long, env = "PULLQ_BATCH_SIZE", default_value_t = MAX_BATCH_SIZE)]
    pub batch_size: usize,

    /// Seconds between stats log lines
    #[arg(long, env = "PULLQ_STATS_INTERVAL_SECS", default_value_t = 10)]
    pub stats_interval_secs: u64,

    /// Stop on its own after this many seconds instead of waiting for Ctrl+C
    #[arg(long, env = "PULLQ_RUN_FOR_SECS")]
    pub run_for_secs: Option<u64>,

    #[arg(long, env = "PULLQ_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, env = "PULLQ_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig::new()
            .with_scheduler_threads(self.scheduler_threads)
            .with_workers(self.worker_core, self.worker_max)
            .with_worker_keep_alive(Duration::from_secs(self.worker_keep_alive_secs))
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_polling_wait_seconds(self.polling_wait_secs)
            .with_batch_size(self.batch_size)
    }

    pub fn queue_names(&self) -> Result<Vec<QueueName>> {
        let mut names = Vec::with_capacity(self.queues.len());
        for raw in &self.queues {
            let name = QueueName::new(raw.trim())
                .with_context(|| format!("invalid queue name {:?}", raw))?;
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            anyhow::bail!("at least one queue is required");
        }
        Ok(names)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn route_ttl(&self) -> Duration {
        Duration::from_secs(self.route_ttl_secs)
    }

    /// Pause between two produced messages, `None` when producing is off
    pub fn produce_interval(&self) -> Option<Duration> {
        (self.produce_rate > 0)
            .then(|| Duration::from_secs(1) / self.produce_rate.min(MAX_PRODUCE_RATE))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}
