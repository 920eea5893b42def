// Consume task execution: listener -> ack -> retrigger

use super::panic_guard::{execute_guarded_async, PanicGuardResult};
use super::TaskHandler;
use crate::application::ack::AckDispatcher;
use crate::application::scheduler::RetriggerHandle;
use crate::domain::{AckBatch, ConsumeTask};
use crate::port::{ConsumerFailure, FailureReporter, MessageListener};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Runs one received batch through the listener
///
/// Whatever the listener does (return handles, fail, panic) the scheduler is
/// retriggered afterwards, so a broken listener never stalls polling.
pub struct ConsumeExecutor {
    listener: Arc<dyn MessageListener>,
    acks: AckDispatcher,
    retrigger: RetriggerHandle,
    reporter: Arc<dyn FailureReporter>,
}

impl ConsumeExecutor {
    pub fn new(
        listener: Arc<dyn MessageListener>,
        acks: AckDispatcher,
        retrigger: RetriggerHandle,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        Self {
            listener,
            acks,
            retrigger,
            reporter,
        }
    }

    async fn consume(&self, task: &ConsumeTask) {
        let queue = task.queue();
        let outcome = execute_guarded_async(self.listener.consume(queue, task.messages())).await;

        match outcome {
            PanicGuardResult::Success(Ok(handles)) => {
                debug!(
                    queue = %queue,
                    received = task.len(),
                    acked = handles.len(),
                    "Batch consumed"
                );
                if let Some(batch) = AckBatch::new(handles) {
                    self.acks.delete_async(queue.clone(), batch);
                }
            }
            PanicGuardResult::Success(Err(error)) => {
                self.reporter.report(ConsumerFailure::ListenerFailed {
                    queue: queue.clone(),
                    batch_size: task.len(),
                    error,
                });
            }
            PanicGuardResult::Panicked(panic) => {
                self.reporter.report(ConsumerFailure::ListenerPanicked {
                    queue: queue.clone(),
                    batch_size: task.len(),
                    panic,
                });
            }
        }
    }
}

#[async_trait]
impl TaskHandler<ConsumeTask> for ConsumeExecutor {
    async fn handle(&self, task: ConsumeTask) {
        self.consume(&task).await;
        self.retrigger.retrigger();
    }
}
