// Application Layer - Consume engine services

pub mod ack;
pub mod admission;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod dispatcher;
pub mod scheduler;
pub mod subscription;
pub mod worker;

// Re-exports
pub use ack::AckDispatcher;
pub use admission::{AdmissionController, FlightPermit, QueueDepth};
pub use config::ConsumerConfig;
pub use consumer::Consumer;
pub use dispatcher::{PullDispatcher, PullOutcome};
pub use scheduler::{PullTrigger, RetriggerHandle, Scheduler, TriggerReason};
pub use subscription::{ConsumerPorts, Subscription, SubscriptionState, SubscriptionStats};
pub use worker::{shutdown_channel, PoolConfig, PoolStats, ShutdownSender, ShutdownToken, WorkerPool};
