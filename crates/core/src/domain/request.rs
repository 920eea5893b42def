// Pull Request / Response Domain Model

use super::error::{DomainError, Result};
use super::message::{Message, ReceiptHandle};
use super::queue::QueueName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Largest batch a single receive may ask for
pub const MAX_BATCH_SIZE: usize = 16;

/// Immutable prototype of a receive request
///
/// Every attempt stamps a copy with its own sequence number via [`PullRequestTemplate::with_seq_no`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestTemplate {
    queue: QueueName,
    batch_size: usize,
    polling_wait: Duration,
}

impl PullRequestTemplate {
    pub fn new(queue: QueueName, batch_size: usize, polling_wait_seconds: u64) -> Result<Self> {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(DomainError::InvalidBatchSize(batch_size));
        }
        Ok(Self {
            queue,
            batch_size,
            polling_wait: Duration::from_secs(polling_wait_seconds),
        })
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn polling_wait(&self) -> Duration {
        self.polling_wait
    }

    pub fn with_seq_no(&self, seq_no: u64) -> PullRequest {
        PullRequest {
            seq_no,
            queue: self.queue.clone(),
            batch_size: self.batch_size,
            polling_wait: self.polling_wait,
        }
    }
}

/// A single receive attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub seq_no: u64,
    pub queue: QueueName,
    pub batch_size: usize,
    /// How long the broker may hold the request open waiting for messages
    pub polling_wait: Duration,
}

/// Broker response code
///
/// Equality and hashing go by the numeric code, so `Other(7000)` equals
/// `NoNewMessages`. Match on [`ResponseCode::normalized`] rather than the raw value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ResponseCode {
    Success,
    NoNewMessages,
    Other(i32),
}

impl ResponseCode {
    pub const SUCCESS: i32 = 0;
    pub const NO_NEW_MESSAGES: i32 = 7000;

    pub fn code(self) -> i32 {
        match self {
            ResponseCode::Success => Self::SUCCESS,
            ResponseCode::NoNewMessages => Self::NO_NEW_MESSAGES,
            ResponseCode::Other(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self.code() == Self::SUCCESS
    }

    /// The canonical variant for this code
    pub fn normalized(self) -> Self {
        Self::from(self.code())
    }
}

impl PartialEq for ResponseCode {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for ResponseCode {}

impl Hash for ResponseCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code().hash(state);
    }
}

impl From<i32> for ResponseCode {
    fn from(code: i32) -> Self {
        match code {
            Self::SUCCESS => ResponseCode::Success,
            Self::NO_NEW_MESSAGES => ResponseCode::NoNewMessages,
            other => ResponseCode::Other(other),
        }
    }
}

impl From<ResponseCode> for i32 {
    fn from(code: ResponseCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.normalized() {
            ResponseCode::Success => write!(f, "SUCCESS"),
            ResponseCode::NoNewMessages => write!(f, "NO_NEW_MESSAGES"),
            ResponseCode::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Outcome of a receive call that reached the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveResult {
    pub code: ResponseCode,
    pub message: String,
    pub messages: Vec<Message>,
}

impl ReceiveResult {
    pub fn success(messages: Vec<Message>) -> Self {
        Self {
            code: ResponseCode::Success,
            message: String::new(),
            messages,
        }
    }

    pub fn no_new_messages() -> Self {
        Self {
            code: ResponseCode::NoNewMessages,
            message: "no message".to_string(),
            messages: Vec::new(),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::from(code),
            message: message.into(),
            messages: Vec::new(),
        }
    }
}

/// Outcome of a delete call that reached the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    pub code: ResponseCode,
    pub message: String,
    /// Handles the broker could not delete (expired or unknown)
    pub failed_handles: Vec<ReceiptHandle>,
}

impl DeleteResult {
    pub fn success() -> Self {
        Self {
            code: ResponseCode::Success,
            message: String::new(),
            failed_handles: Vec::new(),
        }
    }

    /// A delete the broker answered with a non-success code
    pub fn rejected(
        code: i32,
        message: impl Into<String>,
        failed_handles: Vec<ReceiptHandle>,
    ) -> Self {
        Self {
            code: ResponseCode::from(code),
            message: message.into(),
            failed_handles,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.code.is_success() && self.failed_handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> QueueName {
        QueueName::new("orders").unwrap()
    }

    #[test]
    fn test_template_stamps_seq_no() {
        let template = PullRequestTemplate::new(queue(), 16, 5).unwrap();

        let first = template.with_seq_no(7);
        let second = template.with_seq_no(8);

        assert_eq!(first.seq_no, 7);
        assert_eq!(second.seq_no, 8);
        assert_eq!(first.queue, second.queue);
        assert_eq!(first.polling_wait, Duration::from_secs(5));
    }

    #[test]
    fn test_template_rejects_bad_batch_size() {
        assert_eq!(
            PullRequestTemplate::new(queue(), 0, 1).unwrap_err(),
            DomainError::InvalidBatchSize(0)
        );
        assert!(PullRequestTemplate::new(queue(), MAX_BATCH_SIZE + 1, 1).is_err());
    }

    #[test]
    fn test_response_code_mapping() {
        assert_eq!(ResponseCode::from(0), ResponseCode::Success);
        assert_eq!(ResponseCode::from(7000), ResponseCode::NoNewMessages);
        assert_eq!(ResponseCode::from(4440), ResponseCode::Other(4440));
        assert_eq!(ResponseCode::Other(4440).code(), 4440);
        assert_eq!(ResponseCode::NoNewMessages.to_string(), "NO_NEW_MESSAGES");
    }

    #[test]
    fn test_raw_known_codes_equal_their_variants() {
        assert_eq!(ResponseCode::Other(0), ResponseCode::Success);
        assert_eq!(ResponseCode::Other(7000), ResponseCode::NoNewMessages);
        assert_ne!(ResponseCode::Other(4440), ResponseCode::Success);
        assert!(ResponseCode::Other(0).is_success());
        assert!(matches!(
            ResponseCode::Other(7000).normalized(),
            ResponseCode::NoNewMessages
        ));
        assert_eq!(ResponseCode::Other(7000).to_string(), "NO_NEW_MESSAGES");

        let codes: std::collections::HashSet<ResponseCode> =
            [ResponseCode::Success, ResponseCode::Other(0)].into_iter().collect();
        assert_eq!(codes.len(), 1);

        let raw_success = DeleteResult {
            code: ResponseCode::Other(0),
            ..DeleteResult::success()
        };
        assert!(raw_success.is_complete());
        assert!(!DeleteResult::rejected(4410, "stale", vec![ReceiptHandle::new(1)]).is_complete());
        assert!(matches!(DeleteResult::rejected(0, "", Vec::new()).code, ResponseCode::Success));
    }

    #[test]
    fn test_delete_result_completeness() {
        assert!(DeleteResult::success().is_complete());

        let partial = DeleteResult {
            failed_handles: vec![ReceiptHandle::new(9)],
            ..DeleteResult::success()
        };
        assert!(!partial.is_complete());
    }
}
