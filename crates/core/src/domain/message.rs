// Message Domain Model

use super::queue::QueueName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Handle returned with a received message, used to acknowledge (delete) it
///
/// A handle is only valid for one delivery: a redelivered message carries a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(u64);

impl ReceiptHandle {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for ReceiptHandle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A received message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Broker-assigned message id (stable across redeliveries)
    pub id: String,
    pub handle: ReceiptHandle,
    pub body: String,
    pub enqueue_time: i64, // epoch ms
    /// Number of times this message has been handed out, including this delivery
    pub dequeue_count: u32,
}

impl Message {
    pub fn new(id: impl Into<String>, handle: ReceiptHandle, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle,
            body: body.into(),
            enqueue_time: 0,
            dequeue_count: 1,
        }
    }

    /// Decode the body as JSON
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Non-empty set of handles deleted together in one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckBatch(Vec<ReceiptHandle>);

impl AckBatch {
    /// Returns `None` for an empty handle list
    pub fn new(handles: Vec<ReceiptHandle>) -> Option<Self> {
        if handles.is_empty() {
            None
        } else {
            Some(Self(handles))
        }
    }

    pub fn handles(&self) -> &[ReceiptHandle] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_handles(self) -> Vec<ReceiptHandle> {
        self.0
    }
}

/// A received batch waiting for a worker
///
/// Cloning is cheap: the messages are shared, never copied.
#[derive(Debug, Clone)]
pub struct ConsumeTask {
    queue: QueueName,
    messages: Arc<[Message]>,
}

impl ConsumeTask {
    pub fn new(queue: QueueName, messages: Vec<Message>) -> Self {
        Self {
            queue,
            messages: messages.into(),
        }
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_json() {
        #[derive(Deserialize)]
        struct Order {
            id: u32,
        }

        let message = Message::new("m-1", ReceiptHandle::new(1), r#"{"id": 42}"#);
        let order: Order = message.body_json().unwrap();
        assert_eq!(order.id, 42);

        let bad = Message::new("m-2", ReceiptHandle::new(2), "not json");
        assert!(bad.body_json::<Order>().is_err());
    }

    #[test]
    fn test_ack_batch_rejects_empty() {
        assert!(AckBatch::new(vec![]).is_none());
    }

    #[test]
    fn test_ack_batch_keeps_order() {
        let batch = AckBatch::new(vec![3.into(), 1.into(), 2.into()]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.into_handles(),
            vec![ReceiptHandle::new(3), ReceiptHandle::new(1), ReceiptHandle::new(2)]
        );
    }

    #[test]
    fn test_consume_task_shares_messages() {
        let queue = QueueName::new("orders").unwrap();
        let task = ConsumeTask::new(
            queue,
            vec![Message::new("m-1", 1.into(), "a"), Message::new("m-2", 2.into(), "b")],
        );
        let copy = task.clone();

        assert_eq!(copy.len(), 2);
        assert!(std::ptr::eq(task.messages(), copy.messages()));
        assert_eq!(copy.messages()[1].body, "b");
    }
}
