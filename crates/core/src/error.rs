// Central Error Type for the Consumer

use crate::domain::QueueName;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Queue already subscribed: {0}")]
    AlreadySubscribed(QueueName),

    #[error("Queue not subscribed: {0}")]
    NotSubscribed(QueueName),

    #[error("Worker pool closed: {0}")]
    PoolClosed(String),
}

/// Result type alias using ConsumerError
pub type Result<T> = std::result::Result<T, ConsumerError>;
