//! Pull Dispatcher - issues receive calls and routes their results
//!
//! One admitted attempt:
//! 1. stamp the request template with the next sequence number
//! 2. resolve the queue's addresses
//! 3. submit a non-blocking receive (deadline: request timeout + long poll)
//! 4. release the flight slot as soon as submission returns
//! 5. on completion, hand messages to the worker pool; anything but
//!    `NoNewMessages` without messages is reported
//!
//! If 1-3 fail the route is marked stale so the next attempt re-resolves it.

use crate::application::admission::AdmissionController;
use crate::application::scheduler::{PullTrigger, TriggerReason};
use crate::application::worker::WorkerPool;
use crate::domain::{ConsumeTask, PullRequestTemplate, QueueName, ReceiveResult, ResponseCode};
use crate::port::{
    ConsumerFailure, FailureReporter, PendingReceive, Router, SequenceProvider, SubmitError,
    Transport, TransportError,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// What a single pull attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Admission said no; nothing happened
    Denied,
    /// Receive submitted; its result will be handled in the background
    Submitted { seq_no: u64 },
    /// Submission failed; route marked stale
    SubmitFailed { seq_no: u64 },
}

pub struct PullDispatcher {
    template: PullRequestTemplate,
    receive_timeout: Duration,
    admission: Arc<AdmissionController>,
    router: Arc<dyn Router>,
    transport: Arc<dyn Transport>,
    sequence: Arc<dyn SequenceProvider>,
    completion: Arc<ReceiveCompletion>,
}

impl PullDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        template: PullRequestTemplate,
        receive_timeout: Duration,
        admission: Arc<AdmissionController>,
        router: Arc<dyn Router>,
        transport: Arc<dyn Transport>,
        sequence: Arc<dyn SequenceProvider>,
        pool: Arc<WorkerPool<ConsumeTask>>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        let completion = Arc::new(ReceiveCompletion {
            queue: template.queue().clone(),
            pool,
            reporter,
        });
        Self {
            template,
            receive_timeout,
            admission,
            router,
            transport,
            sequence,
            completion,
        }
    }

    pub fn queue(&self) -> &QueueName {
        self.template.queue()
    }

    /// Attempt one pull if admission allows it
    pub async fn try_pull(&self) -> PullOutcome {
        let Some(permit) = self.admission.try_admit() else {
            trace!(
                queue = %self.queue(),
                in_flight = self.admission.in_flight(),
                depth = self.admission.queue_depth(),
                "Pull not admitted"
            );
            return PullOutcome::Denied;
        };

        let seq_no = self.sequence.next_seq_no();
        let submitted = self.submit(seq_no).await;
        permit.release();

        match submitted {
            Ok(pending) => {
                let completion = Arc::clone(&self.completion);
                tokio::spawn(async move {
                    let result = pending.await;
                    completion.on_receive(seq_no, result);
                });
                PullOutcome::Submitted { seq_no }
            }
            Err(error) => {
                self.completion
                    .reporter
                    .report(ConsumerFailure::Submission {
                        queue: self.queue().clone(),
                        seq_no,
                        error,
                    });
                self.router.mark_stale(self.queue());
                PullOutcome::SubmitFailed { seq_no }
            }
        }
    }

    async fn submit(&self, seq_no: u64) -> Result<PendingReceive, SubmitError> {
        let request = self.template.with_seq_no(seq_no);
        let addresses = self.router.resolve(self.queue()).await?;
        let pending = self
            .transport
            .submit_receive(&addresses, request, self.receive_timeout)
            .await?;
        trace!(queue = %self.queue(), seq_no, "Receive submitted");
        Ok(pending)
    }
}

#[async_trait]
impl PullTrigger for PullDispatcher {
    async fn fire(&self, reason: TriggerReason) {
        let stats = self.completion.pool.stats();
        debug!(
            queue = %self.queue(),
            %reason,
            in_flight = self.admission.in_flight(),
            depth = stats.queue_depth,
            active = stats.active_workers,
            "Pull trigger"
        );
        self.try_pull().await;
    }
}

/// Handles receive results off the submitting path
struct ReceiveCompletion {
    queue: QueueName,
    pool: Arc<WorkerPool<ConsumeTask>>,
    reporter: Arc<dyn FailureReporter>,
}

impl ReceiveCompletion {
    fn on_receive(&self, seq_no: u64, result: Result<ReceiveResult, TransportError>) {
        match result {
            Ok(result) => match result.code.normalized() {
                ResponseCode::Success if !result.messages.is_empty() => {
                    let count = result.messages.len();
                    let task = ConsumeTask::new(self.queue.clone(), result.messages);
                    match self.pool.submit(task) {
                        Ok(()) => debug!(queue = %self.queue, seq_no, count, "Batch queued"),
                        Err(e) => debug!(
                            queue = %self.queue,
                            seq_no,
                            count,
                            error = %e,
                            "Batch dropped, left for redelivery"
                        ),
                    }
                }
                ResponseCode::Success | ResponseCode::NoNewMessages => {
                    trace!(queue = %self.queue, seq_no, "No new messages");
                }
                code => {
                    self.reporter.report(ConsumerFailure::ReceiveRejected {
                        queue: self.queue.clone(),
                        seq_no,
                        code,
                        message: result.message,
                    });
                }
            },
            Err(error) => {
                self.reporter.report(ConsumerFailure::ReceiveFailed {
                    queue: self.queue.clone(),
                    seq_no,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::admission::QueueDepth;
    use crate::application::constants::{MAX_FLIGHT, MAX_QUEUE_DEPTH};
    use crate::application::worker::{shutdown_channel, PoolConfig, ShutdownSender, TaskHandler};
    use crate::domain::{Address, Message, ReceiptHandle};
    use crate::port::failure_reporter::mocks::RecordingReporter;
    use crate::port::router::mocks::StaticRouter;
    use crate::port::transport::mocks::{ReceiveScript, RecordingTransport};
    use crate::port::{AtomicSequence, RouteError};
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        pub Router {}

        #[async_trait]
        impl Router for Router {
            async fn resolve(&self, queue: &QueueName) -> Result<Vec<Address>, RouteError>;
            fn mark_stale(&self, queue: &QueueName);
        }
    }

    /// Keeps tasks instead of running them
    #[derive(Default)]
    struct CollectingHandler {
        tasks: Mutex<Vec<ConsumeTask>>,
    }

    #[async_trait]
    impl TaskHandler<ConsumeTask> for CollectingHandler {
        async fn handle(&self, task: ConsumeTask) {
            self.tasks.lock().unwrap().push(task);
        }
    }

    struct Fixture {
        admission: Arc<AdmissionController>,
        transport: Arc<RecordingTransport>,
        reporter: Arc<RecordingReporter>,
        handler: Arc<CollectingHandler>,
        pool: Arc<WorkerPool<ConsumeTask>>,
        dispatcher: PullDispatcher,
        _shutdown: ShutdownSender,
    }

    fn fixture(router: Arc<dyn Router>) -> Fixture {
        let queue = QueueName::new("orders").unwrap();
        let depth = QueueDepth::new();
        let admission = Arc::new(AdmissionController::new(
            MAX_FLIGHT,
            MAX_QUEUE_DEPTH,
            depth.clone(),
        ));
        let transport = Arc::new(RecordingTransport::new());
        let reporter = Arc::new(RecordingReporter::new());
        let handler = Arc::new(CollectingHandler::default());
        let (shutdown, token) = shutdown_channel();
        let pool = Arc::new(WorkerPool::new(
            "orders-consume",
            PoolConfig {
                core: 1,
                max: 1,
                keep_alive: Duration::from_secs(60),
            },
            depth,
            handler.clone(),
            token,
        ));
        let dispatcher = PullDispatcher::new(
            PullRequestTemplate::new(queue, 16, 2).unwrap(),
            Duration::from_millis(3000 + 2000),
            admission.clone(),
            router,
            transport.clone(),
            Arc::new(AtomicSequence::new()),
            pool.clone(),
            reporter.clone(),
        );
        Fixture {
            admission,
            transport,
            reporter,
            handler,
            pool,
            dispatcher,
            _shutdown: shutdown,
        }
    }

    fn messages(handles: &[u64]) -> Vec<Message> {
        handles
            .iter()
            .map(|h| Message::new(format!("msg-{}", h), ReceiptHandle::new(*h), "body"))
            .collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_messages_become_one_consume_task() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));
        f.pool.start().unwrap();
        f.transport.push_messages(messages(&[1, 2, 3]));

        let outcome = f.dispatcher.try_pull().await;
        assert!(matches!(outcome, PullOutcome::Submitted { .. }));
        settle().await;

        let tasks = f.handler.tasks.lock().unwrap().clone();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].len(), 3);
        assert_eq!(tasks[0].queue().as_str(), "orders");
        assert_eq!(f.admission.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_receive_timeout_and_request_shape() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));

        f.dispatcher.try_pull().await;

        let calls = f.transport.receive_calls();
        assert_eq!(calls.len(), 1);
        let (request, timeout) = &calls[0];
        assert_eq!(*timeout, Duration::from_millis(5000));
        assert_eq!(request.batch_size, 16);
        assert_eq!(request.polling_wait, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_sequence_numbers_strictly_increase() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));

        for _ in 0..50 {
            f.dispatcher.try_pull().await;
        }

        let seqs: Vec<u64> = f
            .transport
            .receive_calls()
            .iter()
            .map(|(r, _)| r.seq_no)
            .collect();
        assert_eq!(seqs.len(), 50);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_no_new_messages_creates_no_task_and_no_report() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));
        f.pool.start().unwrap();
        f.transport
            .push_receive(ReceiveScript::Respond(ReceiveResult::no_new_messages()));

        f.dispatcher.try_pull().await;
        settle().await;

        assert!(f.handler.tasks.lock().unwrap().is_empty());
        assert_eq!(f.pool.stats().queue_depth, 0);
        assert_eq!(f.reporter.count(), 0);
    }

    #[tokio::test]
    async fn test_raw_no_new_messages_code_is_not_a_failure() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));
        f.pool.start().unwrap();
        f.transport.push_receive(ReceiveScript::Respond(ReceiveResult {
            code: ResponseCode::Other(ResponseCode::NO_NEW_MESSAGES),
            message: "no message".to_string(),
            messages: Vec::new(),
        }));
        f.transport.push_receive(ReceiveScript::Respond(ReceiveResult {
            code: ResponseCode::Other(ResponseCode::SUCCESS),
            message: String::new(),
            messages: messages(&[1, 2]),
        }));

        f.dispatcher.try_pull().await;
        f.dispatcher.try_pull().await;
        settle().await;

        assert_eq!(f.reporter.count(), 0);
        let tasks = f.handler.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].len(), 2);
    }

    #[tokio::test]
    async fn test_error_code_reported_without_task() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));
        f.pool.start().unwrap();
        f.transport.push_receive(ReceiveScript::Respond(ReceiveResult::error(
            4440,
            "queue not exist",
        )));

        f.dispatcher.try_pull().await;
        settle().await;

        assert!(f.handler.tasks.lock().unwrap().is_empty());
        let failures = f.reporter.failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            ConsumerFailure::ReceiveRejected { code: ResponseCode::Other(4440), .. }
        ));
    }

    #[tokio::test]
    async fn test_async_transport_failure_reported() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));
        f.transport.push_receive(ReceiveScript::Fail(TransportError::Timeout(
            Duration::from_secs(5),
        )));

        let outcome = f.dispatcher.try_pull().await;
        settle().await;

        assert!(matches!(outcome, PullOutcome::Submitted { .. }));
        assert_eq!(f.reporter.count_kind("receive_failed"), 1);
    }

    #[tokio::test]
    async fn test_route_failure_marks_stale_once_and_releases() {
        let mut router = MockRouter::new();
        router
            .expect_resolve()
            .times(1)
            .returning(|q| Err(RouteError::NoRoute(q.to_string())));
        router.expect_mark_stale().times(1).return_const(());

        let f = fixture(Arc::new(router));

        let outcome = f.dispatcher.try_pull().await;

        assert!(matches!(outcome, PullOutcome::SubmitFailed { .. }));
        assert_eq!(f.admission.in_flight(), 0, "flight slot must be released");
        assert_eq!(f.reporter.count_kind("submission"), 1);
        assert_eq!(f.transport.receive_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_submit_failure_marks_stale() {
        let router = Arc::new(StaticRouter::single("broker-1:6000"));
        let f = fixture(router.clone());
        f.transport
            .push_receive(ReceiveScript::SubmitError(TransportError::Busy));

        let outcome = f.dispatcher.try_pull().await;

        assert!(matches!(outcome, PullOutcome::SubmitFailed { .. }));
        assert_eq!(router.stale_count(), 1);
        assert_eq!(f.admission.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_denied_attempt_touches_nothing() {
        let router = Arc::new(StaticRouter::single("broker-1:6000"));
        let f = fixture(router.clone());
        let _held: Vec<_> = (0..MAX_FLIGHT)
            .map(|_| f.admission.try_admit().unwrap())
            .collect();

        assert_eq!(f.dispatcher.try_pull().await, PullOutcome::Denied);
        assert_eq!(router.resolve_count(), 0);
        assert_eq!(f.transport.receive_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_drops_batch() {
        let f = fixture(Arc::new(StaticRouter::single("broker-1:6000")));
        f.pool.stop_accepting();
        f.transport.push_messages(messages(&[1]));

        f.dispatcher.try_pull().await;
        settle().await;

        assert_eq!(f.pool.stats().queue_depth, 0);
        assert_eq!(f.reporter.count(), 0);
    }
}
