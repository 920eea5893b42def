// Transport Port (Interface)
// Non-blocking receive/delete calls against broker addresses

use crate::domain::{AckBatch, Address, DeleteResult, PullRequest, QueueName, ReceiveResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No reachable address among {0:?}")]
    Unreachable(Vec<Address>),

    #[error("Send buffer full")]
    Busy,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Completion of a submitted receive call
pub type PendingReceive = BoxFuture<'static, Result<ReceiveResult, TransportError>>;

/// Completion of a submitted delete call
pub type PendingDelete = BoxFuture<'static, Result<DeleteResult, TransportError>>;

/// Transport trait
///
/// Calls are split in two phases. `submit_*` hands the request to the transport and may
/// wait briefly for send capacity; it fails if the request could not be accepted at all.
/// The returned future resolves when the broker answers, and is awaited by whoever wants
/// the answer, never by the submitter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a batch receive
    ///
    /// # Arguments
    /// * `addresses` - Broker addresses serving the queue
    /// * `request` - Receive request stamped with its sequence number
    /// * `timeout` - Deadline for the whole call, including the broker's long poll
    async fn submit_receive(
        &self,
        addresses: &[Address],
        request: PullRequest,
        timeout: Duration,
    ) -> Result<PendingReceive, TransportError>;

    /// Submit a batch delete for acknowledged messages
    async fn submit_delete(
        &self,
        addresses: &[Address],
        queue: &QueueName,
        batch: AckBatch,
    ) -> Result<PendingDelete, TransportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ReceiptHandle;
    use futures::FutureExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted answer to a receive call
    #[derive(Debug, Clone)]
    pub enum ReceiveScript {
        /// Reject the submission itself
        SubmitError(TransportError),
        /// Accept, then fail asynchronously
        Fail(TransportError),
        /// Accept, then answer with this result
        Respond(ReceiveResult),
    }

    /// A recorded delete call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct DeleteCall {
        pub addresses: Vec<Address>,
        pub queue: QueueName,
        pub handles: Vec<ReceiptHandle>,
    }

    /// Transport answering from a script and recording every call
    ///
    /// Once the script runs out, receives answer `NoNewMessages`.
    pub struct RecordingTransport {
        receive_script: Mutex<VecDeque<ReceiveScript>>,
        delete_result: Mutex<Result<DeleteResult, TransportError>>,
        receives: Mutex<Vec<(PullRequest, Duration)>>,
        deletes: Mutex<Vec<DeleteCall>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self {
                receive_script: Mutex::new(VecDeque::new()),
                delete_result: Mutex::new(Ok(DeleteResult::success())),
                receives: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
            }
        }

        pub fn push_receive(&self, script: ReceiveScript) {
            self.receive_script.lock().unwrap().push_back(script);
        }

        pub fn push_messages(&self, messages: Vec<crate::domain::Message>) {
            self.push_receive(ReceiveScript::Respond(ReceiveResult::success(messages)));
        }

        pub fn set_delete_result(&self, result: Result<DeleteResult, TransportError>) {
            *self.delete_result.lock().unwrap() = result;
        }

        pub fn receive_calls(&self) -> Vec<(PullRequest, Duration)> {
            self.receives.lock().unwrap().clone()
        }

        pub fn receive_count(&self) -> usize {
            self.receives.lock().unwrap().len()
        }

        pub fn delete_calls(&self) -> Vec<DeleteCall> {
            self.deletes.lock().unwrap().clone()
        }
    }

    impl Default for RecordingTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn submit_receive(
            &self,
            _addresses: &[Address],
            request: PullRequest,
            timeout: Duration,
        ) -> Result<PendingReceive, TransportError> {
            self.receives.lock().unwrap().push((request, timeout));

            let script = self
                .receive_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ReceiveScript::Respond(ReceiveResult::no_new_messages()));

            match script {
                ReceiveScript::SubmitError(e) => Err(e),
                ReceiveScript::Fail(e) => Ok(async move { Err(e) }.boxed()),
                ReceiveScript::Respond(result) => Ok(async move { Ok(result) }.boxed()),
            }
        }

        async fn submit_delete(
            &self,
            addresses: &[Address],
            queue: &QueueName,
            batch: AckBatch,
        ) -> Result<PendingDelete, TransportError> {
            self.deletes.lock().unwrap().push(DeleteCall {
                addresses: addresses.to_vec(),
                queue: queue.clone(),
                handles: batch.into_handles(),
            });

            let result = self.delete_result.lock().unwrap().clone();
            Ok(async move { result }.boxed())
        }
    }
}
