// In-process Transport over a MemoryCluster
//
// Mirrors a networked client: a bounded number of outstanding calls (send capacity),
// a per-call deadline, and broker errors mapped to response codes.

use crate::broker::{BrokerError, MemoryBroker};
use crate::cluster::MemoryCluster;
use async_trait::async_trait;
use futures::FutureExt;
use pullq_core::domain::{AckBatch, Address, DeleteResult, PullRequest, QueueName, ReceiveResult};
use pullq_core::port::{PendingDelete, PendingReceive, Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Response code for a queue the broker does not host
pub const QUEUE_NOT_EXIST: i32 = 4440;

/// Response code for a delete where some receipt handles matched nothing
pub const RECEIPT_HANDLE_INVALID: i32 = 4410;

/// Response code for a message body above the broker limit
pub const MESSAGE_TOO_LARGE: i32 = 4430;

/// Response code for creating a queue that is already there
pub const QUEUE_EXISTS: i32 = 4460;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Calls that may be outstanding at once
    pub max_outstanding: usize,
    /// How long a submission may wait for send capacity before failing with `Busy`
    pub send_wait: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_outstanding: 64,
            send_wait: Duration::from_millis(100),
        }
    }
}

pub struct MemoryTransport {
    cluster: Arc<MemoryCluster>,
    capacity: Arc<Semaphore>,
    send_wait: Duration,
}

impl MemoryTransport {
    pub fn new(cluster: Arc<MemoryCluster>, config: TransportConfig) -> Self {
        Self {
            cluster,
            capacity: Arc::new(Semaphore::new(config.max_outstanding.max(1))),
            send_wait: config.send_wait,
        }
    }

    pub fn available_capacity(&self) -> usize {
        self.capacity.available_permits()
    }

    async fn connect(
        &self,
        addresses: &[Address],
    ) -> Result<(Address, Arc<MemoryBroker>, OwnedSemaphorePermit), TransportError> {
        let (address, broker) = self
            .cluster
            .reachable(addresses)
            .ok_or_else(|| TransportError::Unreachable(addresses.to_vec()))?;

        let permit = tokio::time::timeout(self.send_wait, Arc::clone(&self.capacity).acquire_owned())
            .await
            .map_err(|_| TransportError::Busy)?
            .map_err(|_| TransportError::ConnectionClosed("transport closed".to_string()))?;

        Ok((address, broker, permit))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn submit_receive(
        &self,
        addresses: &[Address],
        request: PullRequest,
        timeout: Duration,
    ) -> Result<PendingReceive, TransportError> {
        let (address, broker, permit) = self.connect(addresses).await?;
        trace!(
            node = %address,
            queue = %request.queue,
            seq_no = request.seq_no,
            "Receive submitted"
        );

        Ok(async move {
            let _permit = permit;
            let call = broker.receive(&request.queue, request.batch_size, request.polling_wait);
            match tokio::time::timeout(timeout, call).await {
                Err(_) => Err(TransportError::Timeout(timeout)),
                Ok(Ok(messages)) if messages.is_empty() => Ok(ReceiveResult::no_new_messages()),
                Ok(Ok(messages)) => Ok(ReceiveResult::success(messages)),
                Ok(Err(e)) => Ok(ReceiveResult::error(error_code(&e), e.to_string())),
            }
        }
        .boxed())
    }

    async fn submit_delete(
        &self,
        addresses: &[Address],
        queue: &QueueName,
        batch: AckBatch,
    ) -> Result<PendingDelete, TransportError> {
        let (address, broker, permit) = self.connect(addresses).await?;
        let queue = queue.clone();
        trace!(node = %address, queue = %queue, count = batch.len(), "Delete submitted");

        Ok(async move {
            let _permit = permit;
            let result = match broker.delete(&queue, batch.handles()) {
                Ok(failed) if failed.is_empty() => DeleteResult::success(),
                Ok(failed) => DeleteResult::rejected(
                    RECEIPT_HANDLE_INVALID,
                    format!("{} receipt handle(s) matched no message", failed.len()),
                    failed,
                ),
                Err(e) => DeleteResult::rejected(error_code(&e), e.to_string(), Vec::new()),
            };
            Ok(result)
        }
        .boxed())
    }
}

fn error_code(error: &BrokerError) -> i32 {
    match error {
        BrokerError::QueueNotExist(_) => QUEUE_NOT_EXIST,
        BrokerError::QueueExists(_) => QUEUE_EXISTS,
        BrokerError::MessageTooLarge { .. } => MESSAGE_TOO_LARGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerConfig;
    use pullq_core::domain::{PullRequestTemplate, ReceiptHandle, ResponseCode};
    use pullq_core::port::time_provider::mocks::ManualClock;

    fn queue() -> QueueName {
        QueueName::new("orders").unwrap()
    }

    fn setup(config: TransportConfig) -> (Arc<MemoryBroker>, Arc<MemoryCluster>, MemoryTransport) {
        let broker = Arc::new(MemoryBroker::new(
            "store",
            BrokerConfig::default(),
            Arc::new(ManualClock::new(0)),
        ));
        broker.create_queue(&queue()).unwrap();
        let cluster = Arc::new(MemoryCluster::new());
        cluster.add_node("b-1", broker.clone());
        cluster.add_node("b-2", broker.clone());
        let transport = MemoryTransport::new(cluster.clone(), config);
        (broker, cluster, transport)
    }

    fn request(queue: QueueName, wait_seconds: u64) -> PullRequest {
        PullRequestTemplate::new(queue, 16, wait_seconds)
            .unwrap()
            .with_seq_no(1)
    }

    fn addresses() -> Vec<Address> {
        vec!["b-1".to_string(), "b-2".to_string()]
    }

    #[tokio::test]
    async fn test_receive_and_delete() {
        let (broker, _cluster, transport) = setup(TransportConfig::default());
        broker.send(&queue(), "hello").unwrap();

        let pending = transport
            .submit_receive(&addresses(), request(queue(), 0), Duration::from_secs(1))
            .await
            .unwrap();
        let result = pending.await.unwrap();
        assert_eq!(result.code, ResponseCode::Success);
        assert_eq!(result.messages.len(), 1);

        let batch = AckBatch::new(vec![result.messages[0].handle]).unwrap();
        let deleted = transport
            .submit_delete(&addresses(), &queue(), batch)
            .await
            .unwrap()
            .await
            .unwrap();
        assert!(deleted.is_complete());
        assert_eq!(broker.queue_stats(&queue()).unwrap().in_flight, 0);
    }

    #[tokio::test]
    async fn test_empty_queue_answers_no_new_messages() {
        let (_broker, _cluster, transport) = setup(TransportConfig::default());

        let result = transport
            .submit_receive(&addresses(), request(queue(), 0), Duration::from_secs(1))
            .await
            .unwrap()
            .await
            .unwrap();

        assert_eq!(result.code, ResponseCode::NoNewMessages);
    }

    #[tokio::test]
    async fn test_unknown_queue_maps_to_error_code() {
        let (_broker, _cluster, transport) = setup(TransportConfig::default());

        let result = transport
            .submit_receive(
                &addresses(),
                request(QueueName::new("missing").unwrap(), 0),
                Duration::from_secs(1),
            )
            .await
            .unwrap()
            .await
            .unwrap();

        assert_eq!(result.code, ResponseCode::Other(QUEUE_NOT_EXIST));
    }

    #[tokio::test]
    async fn test_fails_over_then_unreachable() {
        let (broker, cluster, transport) = setup(TransportConfig::default());
        broker.send(&queue(), "hello").unwrap();
        cluster.set_online("b-1", false);

        let result = transport
            .submit_receive(&addresses(), request(queue(), 0), Duration::from_secs(1))
            .await
            .unwrap()
            .await
            .unwrap();
        assert_eq!(result.messages.len(), 1);

        // The handle from b-2 is good on any node fronting the same store
        cluster.set_online("b-1", true);
        let batch = AckBatch::new(vec![result.messages[0].handle]).unwrap();
        let deleted = transport
            .submit_delete(&addresses(), &queue(), batch)
            .await
            .unwrap()
            .await
            .unwrap();
        assert!(deleted.is_complete());

        cluster.set_online("b-1", false);
        cluster.set_online("b-2", false);

        let err = transport
            .submit_receive(&addresses(), request(queue(), 0), Duration::from_secs(1))
            .await
            .err()
            .unwrap();

        assert_eq!(err, TransportError::Unreachable(addresses()));
    }

    #[tokio::test]
    async fn test_deadline_shorter_than_long_poll_times_out() {
        let (_broker, _cluster, transport) = setup(TransportConfig::default());

        let err = transport
            .submit_receive(&addresses(), request(queue(), 2), Duration::from_millis(100))
            .await
            .unwrap()
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_busy_when_capacity_exhausted() {
        let (_broker, _cluster, transport) = setup(TransportConfig {
            max_outstanding: 1,
            send_wait: Duration::from_millis(20),
        });

        let held = transport
            .submit_receive(&addresses(), request(queue(), 1), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(transport.available_capacity(), 0);

        let err = transport
            .submit_receive(&addresses(), request(queue(), 0), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert_eq!(err, TransportError::Busy);

        drop(held);
        assert_eq!(transport.available_capacity(), 1);
    }

    #[tokio::test]
    async fn test_partial_delete_reports_failed_handles() {
        let (_broker, _cluster, transport) = setup(TransportConfig::default());
        let batch = AckBatch::new(vec![ReceiptHandle::new(999)]).unwrap();

        let result = transport
            .submit_delete(&addresses(), &queue(), batch)
            .await
            .unwrap()
            .await
            .unwrap();

        assert_eq!(result.code, ResponseCode::Other(RECEIPT_HANDLE_INVALID));
        assert_eq!(result.failed_handles, vec![ReceiptHandle::new(999)]);
        assert!(!result.is_complete());
    }
}
