// Message Listener Port (user callback)

use crate::domain::{Message, QueueName, ReceiptHandle};
use async_trait::async_trait;
use thiserror::Error;

/// Listener errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Consume failed: {0}")]
    Failed(String),

    #[error("Invalid message {id}: {reason}")]
    InvalidMessage { id: String, reason: String },
}

/// User-supplied batch processor
///
/// Called concurrently from several workers, each with a different batch.
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// Process a batch and return the handles of messages to acknowledge
    ///
    /// Messages whose handles are not returned stay on the broker and are redelivered
    /// once their visibility timeout expires. An error acknowledges nothing.
    async fn consume(
        &self,
        queue: &QueueName,
        messages: &[Message],
    ) -> Result<Vec<ReceiptHandle>, ListenerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock listener behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Acknowledge every message in the batch
        AckAll,
        /// Acknowledge nothing
        AckNone,
        /// Acknowledge exactly these handles
        AckHandles(Vec<ReceiptHandle>),
        /// Fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Listener recording every batch it receives
    pub struct RecordingListener {
        behavior: Mutex<MockBehavior>,
        delay: Option<Duration>,
        batches: Mutex<Vec<Vec<Message>>>,
        call_count: AtomicUsize,
    }

    impl RecordingListener {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                delay: None,
                batches: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn ack_all() -> Self {
            Self::new(MockBehavior::AckAll)
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn panicking(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        /// Sleep this long inside every call (simulates slow processing)
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn batches(&self) -> Vec<Vec<Message>> {
            self.batches.lock().unwrap().clone()
        }

        pub fn message_count(&self) -> usize {
            self.batches.lock().unwrap().iter().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl MessageListener for RecordingListener {
        async fn consume(
            &self,
            _queue: &QueueName,
            messages: &[Message],
        ) -> Result<Vec<ReceiptHandle>, ListenerError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(messages.to_vec());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                MockBehavior::AckAll => Ok(messages.iter().map(|m| m.handle).collect()),
                MockBehavior::AckNone => Ok(Vec::new()),
                MockBehavior::AckHandles(handles) => Ok(handles),
                MockBehavior::Fail(msg) => Err(ListenerError::Failed(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
            }
        }
    }
}
