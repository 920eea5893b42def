// Failure Reporter Port
// Every non-fatal failure of the consume loop goes through here

use crate::domain::{QueueName, ReceiptHandle, ResponseCode};
use crate::port::{ListenerError, RouteError, TransportError};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

/// Why a pull could not be submitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A failure observed by the consume loop
///
/// None of these stop the loop; they are reported and the next tick carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerFailure {
    /// Receive could not be submitted (route invalidated)
    Submission {
        queue: QueueName,
        seq_no: u64,
        error: SubmitError,
    },
    /// Broker answered a receive with an error code
    ReceiveRejected {
        queue: QueueName,
        seq_no: u64,
        code: ResponseCode,
        message: String,
    },
    /// Receive failed after submission
    ReceiveFailed {
        queue: QueueName,
        seq_no: u64,
        error: TransportError,
    },
    /// Listener returned an error
    ListenerFailed {
        queue: QueueName,
        batch_size: usize,
        error: ListenerError,
    },
    /// Listener panicked
    ListenerPanicked {
        queue: QueueName,
        batch_size: usize,
        panic: String,
    },
    /// Delete could not be submitted
    AckSubmission {
        queue: QueueName,
        handles: Vec<ReceiptHandle>,
        error: SubmitError,
    },
    /// Delete failed after submission
    AckFailed {
        queue: QueueName,
        handles: Vec<ReceiptHandle>,
        error: TransportError,
    },
    /// Broker rejected all or part of a delete
    AckRejected {
        queue: QueueName,
        code: ResponseCode,
        message: String,
        failed_handles: Vec<ReceiptHandle>,
    },
}

impl ConsumerFailure {
    pub fn queue(&self) -> &QueueName {
        match self {
            ConsumerFailure::Submission { queue, .. }
            | ConsumerFailure::ReceiveRejected { queue, .. }
            | ConsumerFailure::ReceiveFailed { queue, .. }
            | ConsumerFailure::ListenerFailed { queue, .. }
            | ConsumerFailure::ListenerPanicked { queue, .. }
            | ConsumerFailure::AckSubmission { queue, .. }
            | ConsumerFailure::AckFailed { queue, .. }
            | ConsumerFailure::AckRejected { queue, .. } => queue,
        }
    }

    /// Short stable name, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            ConsumerFailure::Submission { .. } => "submission",
            ConsumerFailure::ReceiveRejected { .. } => "receive_rejected",
            ConsumerFailure::ReceiveFailed { .. } => "receive_failed",
            ConsumerFailure::ListenerFailed { .. } => "listener_failed",
            ConsumerFailure::ListenerPanicked { .. } => "listener_panicked",
            ConsumerFailure::AckSubmission { .. } => "ack_submission",
            ConsumerFailure::AckFailed { .. } => "ack_failed",
            ConsumerFailure::AckRejected { .. } => "ack_rejected",
        }
    }
}

impl fmt::Display for ConsumerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerFailure::Submission { seq_no, error, .. } => {
                write!(f, "pull #{} not submitted: {}", seq_no, error)
            }
            ConsumerFailure::ReceiveRejected {
                seq_no,
                code,
                message,
                ..
            } => write!(f, "pull #{} rejected ({}): {}", seq_no, code, message),
            ConsumerFailure::ReceiveFailed { seq_no, error, .. } => {
                write!(f, "pull #{} failed: {}", seq_no, error)
            }
            ConsumerFailure::ListenerFailed {
                batch_size, error, ..
            } => write!(f, "listener failed on {} messages: {}", batch_size, error),
            ConsumerFailure::ListenerPanicked {
                batch_size, panic, ..
            } => write!(f, "listener panicked on {} messages: {}", batch_size, panic),
            ConsumerFailure::AckSubmission { handles, error, .. } => {
                write!(f, "delete of {} handles not submitted: {}", handles.len(), error)
            }
            ConsumerFailure::AckFailed { handles, error, .. } => {
                write!(f, "delete of {} handles failed: {}", handles.len(), error)
            }
            ConsumerFailure::AckRejected {
                code,
                message,
                failed_handles,
                ..
            } => write!(
                f,
                "delete rejected ({}): {} ({} handles not deleted)",
                code,
                message,
                failed_handles.len()
            ),
        }
    }
}

/// Failure sink
pub trait FailureReporter: Send + Sync {
    fn report(&self, failure: ConsumerFailure);
}

/// Reporter writing every failure to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureReporter;

impl FailureReporter for TracingFailureReporter {
    fn report(&self, failure: ConsumerFailure) {
        let queue = failure.queue().clone();
        let kind = failure.kind();
        match failure {
            ConsumerFailure::Submission { .. } | ConsumerFailure::ListenerPanicked { .. } => {
                error!(queue = %queue, kind, "{}", failure);
            }
            _ => {
                warn!(queue = %queue, kind, "{}", failure);
            }
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Reporter keeping every failure for assertions
    #[derive(Default)]
    pub struct RecordingReporter {
        failures: Mutex<Vec<ConsumerFailure>>,
    }

    impl RecordingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failures(&self) -> Vec<ConsumerFailure> {
            self.failures.lock().unwrap().clone()
        }

        pub fn count(&self) -> usize {
            self.failures.lock().unwrap().len()
        }

        pub fn count_kind(&self, kind: &str) -> usize {
            self.failures
                .lock()
                .unwrap()
                .iter()
                .filter(|f| f.kind() == kind)
                .count()
        }
    }

    impl FailureReporter for RecordingReporter {
        fn report(&self, failure: ConsumerFailure) {
            self.failures.lock().unwrap().push(failure);
        }
    }
}
