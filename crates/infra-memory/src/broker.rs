// In-memory broker: named queues with visibility timeouts and long polling

use pullq_core::domain::{Message, QueueName, ReceiptHandle};
use pullq_core::port::TimeProvider;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// How often a long poll re-checks for messages whose visibility ran out
const LONG_POLL_RECHECK: Duration = Duration::from_millis(50);

/// Broker errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Queue does not exist: {0}")]
    QueueNotExist(QueueName),

    #[error("Queue already exists: {0}")]
    QueueExists(QueueName),

    #[error("Message body too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// How long a received message stays hidden before it is handed out again
    pub visibility_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_message_size: 64 * 1024,
        }
    }
}

/// Message counts of one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Ready to be received
    pub visible: usize,
    /// Received, not yet deleted, visibility timeout still running
    pub in_flight: usize,
}

struct StoredMessage {
    id: String,
    body: String,
    enqueue_time: i64,
    dequeue_count: u32,
    visible_at: i64,
    handle: Option<ReceiptHandle>,
}

struct QueueState {
    messages: VecDeque<StoredMessage>,
    arrivals: Arc<Notify>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            arrivals: Arc::new(Notify::new()),
        }
    }
}

/// Queue store shared by every node that fronts it
pub struct MemoryBroker {
    name: String,
    config: BrokerConfig,
    clock: Arc<dyn TimeProvider>,
    queues: Mutex<HashMap<QueueName, QueueState>>,
    next_handle: AtomicU64,
}

impl MemoryBroker {
    pub fn new(name: impl Into<String>, config: BrokerConfig, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            queues: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn create_queue(&self, queue: &QueueName) -> Result<(), BrokerError> {
        let mut queues = self.lock();
        if queues.contains_key(queue) {
            return Err(BrokerError::QueueExists(queue.clone()));
        }
        queues.insert(queue.clone(), QueueState::new());
        debug!(broker = %self.name, queue = %queue, "Queue created");
        Ok(())
    }

    /// Drop a queue with every message in it
    pub fn delete_queue(&self, queue: &QueueName) -> Result<(), BrokerError> {
        let removed = self
            .lock()
            .remove(queue)
            .ok_or_else(|| BrokerError::QueueNotExist(queue.clone()))?;
        // Wake long polls so they notice the queue is gone
        removed.arrivals.notify_waiters();
        debug!(broker = %self.name, queue = %queue, "Queue deleted");
        Ok(())
    }

    pub fn has_queue(&self, queue: &QueueName) -> bool {
        self.lock().contains_key(queue)
    }

    pub fn queue_names(&self) -> Vec<QueueName> {
        let mut names: Vec<QueueName> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Append a message; returns its id
    pub fn send(&self, queue: &QueueName, body: impl Into<String>) -> Result<String, BrokerError> {
        let body = body.into();
        if body.len() > self.config.max_message_size {
            return Err(BrokerError::MessageTooLarge {
                size: body.len(),
                max: self.config.max_message_size,
            });
        }

        let now = self.clock.now_millis();
        let id = uuid::Uuid::new_v4().to_string();
        let mut queues = self.lock();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotExist(queue.clone()))?;
        state.messages.push_back(StoredMessage {
            id: id.clone(),
            body,
            enqueue_time: now,
            dequeue_count: 0,
            visible_at: now,
            handle: None,
        });
        state.arrivals.notify_waiters();

        trace!(broker = %self.name, queue = %queue, id = %id, "Message sent");
        Ok(id)
    }

    /// Receive up to `batch_size` visible messages, waiting up to `wait` for one to show up
    ///
    /// Every returned message gets a fresh receipt handle and stays hidden for the
    /// visibility timeout. An empty result means the wait ran out.
    pub async fn receive(
        &self,
        queue: &QueueName,
        batch_size: usize,
        wait: Duration,
    ) -> Result<Vec<Message>, BrokerError> {
        let deadline = Instant::now() + wait;

        loop {
            let arrivals: Arc<Notify>;
            let mut notified;
            {
                let mut queues = self.lock();
                let state = queues
                    .get_mut(queue)
                    .ok_or_else(|| BrokerError::QueueNotExist(queue.clone()))?;
                let taken = self.take_visible(state, batch_size);
                if !taken.is_empty() {
                    trace!(broker = %self.name, queue = %queue, count = taken.len(), "Messages received");
                    return Ok(taken);
                }
                // Registered while the lock is held, so a send right after still wakes us
                arrivals = Arc::clone(&state.arrivals);
                notified = Box::pin(arrivals.notified());
                notified.as_mut().enable();
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            // The recheck only covers messages whose visibility timeout ran out
            let slice = (deadline - now).min(LONG_POLL_RECHECK);
            let _ = tokio::time::timeout(slice, notified).await;
        }
    }

    /// Delete received messages; returns the handles that matched nothing
    ///
    /// A handle stops matching once its message has been handed out again.
    pub fn delete(
        &self,
        queue: &QueueName,
        handles: &[ReceiptHandle],
    ) -> Result<Vec<ReceiptHandle>, BrokerError> {
        let mut queues = self.lock();
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotExist(queue.clone()))?;

        let mut failed = Vec::new();
        for handle in handles {
            match state.messages.iter().position(|m| m.handle == Some(*handle)) {
                Some(index) => {
                    state.messages.remove(index);
                }
                None => failed.push(*handle),
            }
        }

        trace!(
            broker = %self.name,
            queue = %queue,
            deleted = handles.len() - failed.len(),
            failed = failed.len(),
            "Messages deleted"
        );
        Ok(failed)
    }

    pub fn queue_stats(&self, queue: &QueueName) -> Result<QueueStats, BrokerError> {
        let now = self.clock.now_millis();
        let queues = self.lock();
        let state = queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueNotExist(queue.clone()))?;
        let visible = state.messages.iter().filter(|m| m.visible_at <= now).count();
        Ok(QueueStats {
            visible,
            in_flight: state.messages.len() - visible,
        })
    }

    fn take_visible(&self, state: &mut QueueState, batch_size: usize) -> Vec<Message> {
        let now = self.clock.now_millis();
        let hidden_until = now + self.config.visibility_timeout.as_millis() as i64;

        state
            .messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(batch_size)
            .map(|stored| {
                let handle = ReceiptHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
                stored.handle = Some(handle);
                stored.visible_at = hidden_until;
                stored.dequeue_count += 1;
                Message {
                    id: stored.id.clone(),
                    handle,
                    body: stored.body.clone(),
                    enqueue_time: stored.enqueue_time,
                    dequeue_count: stored.dequeue_count,
                }
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueueName, QueueState>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
