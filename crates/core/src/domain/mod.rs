// Domain Layer - Queue, message and request types

pub mod error;
pub mod message;
pub mod queue;
pub mod request;

// Re-exports
pub use error::DomainError;
pub use message::{AckBatch, ConsumeTask, Message, ReceiptHandle};
pub use queue::{Address, QueueName};
pub use request::{
    DeleteResult, PullRequest, PullRequestTemplate, ReceiveResult, ResponseCode, MAX_BATCH_SIZE,
};
