// Ack Dispatcher - fire-and-forget batch deletes

use crate::domain::{AckBatch, QueueName};
use crate::port::{ConsumerFailure, FailureReporter, Router, SubmitError, Transport};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Deletes acknowledged messages without ever blocking or failing the caller
///
/// There is no retry: a delete that fails is reported and the broker will redeliver the
/// messages once their visibility timeout runs out.
#[derive(Clone)]
pub struct AckDispatcher {
    router: Arc<dyn Router>,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn FailureReporter>,
}

impl AckDispatcher {
    pub fn new(
        router: Arc<dyn Router>,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        Self {
            router,
            transport,
            reporter,
        }
    }

    /// Delete a batch in the background
    ///
    /// Returns the background task handle; callers are free to drop it.
    pub fn delete_async(&self, queue: QueueName, batch: AckBatch) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.delete(queue, batch).await })
    }

    async fn delete(&self, queue: QueueName, batch: AckBatch) {
        let handles = batch.handles().to_vec();

        let pending = match self.submit(&queue, batch).await {
            Ok(pending) => pending,
            Err(error) => {
                self.reporter.report(ConsumerFailure::AckSubmission {
                    queue,
                    handles,
                    error,
                });
                return;
            }
        };

        match pending.await {
            Ok(result) if result.is_complete() => {
                debug!(queue = %queue, count = handles.len(), "Delete succeeded");
            }
            Ok(result) => {
                self.reporter.report(ConsumerFailure::AckRejected {
                    queue,
                    code: result.code,
                    message: result.message,
                    failed_handles: if result.failed_handles.is_empty() {
                        handles
                    } else {
                        result.failed_handles
                    },
                });
            }
            Err(error) => {
                self.reporter.report(ConsumerFailure::AckFailed {
                    queue,
                    handles,
                    error,
                });
            }
        }
    }

    async fn submit(
        &self,
        queue: &QueueName,
        batch: AckBatch,
    ) -> Result<crate::port::PendingDelete, SubmitError> {
        let addresses = self.router.resolve(queue).await?;
        let pending = self
            .transport
            .submit_delete(&addresses, queue, batch)
            .await?;
        Ok(pending)
    }
}
