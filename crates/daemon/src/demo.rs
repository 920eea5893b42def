//! Demo workload: a producer feeding the in-process brokers and a listener
//! that decodes, logs and acknowledges what it receives

use async_trait::async_trait;
use pullq_core::application::ShutdownToken;
use pullq_core::domain::{Message, QueueName, ReceiptHandle};
use pullq_core::port::{ListenerError, MessageListener};
use pullq_infra_memory::MemoryBroker;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Payload the producer sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoOrder {
    pub order_id: u64,
    pub amount_cents: u64,
}

/// Sends one order per tick to each queue
pub struct DemoProducer {
    broker: Arc<MemoryBroker>,
    queues: Vec<QueueName>,
    interval: Duration,
}

impl DemoProducer {
    pub fn new(broker: Arc<MemoryBroker>, queues: Vec<QueueName>, interval: Duration) -> Self {
        Self {
            broker,
            queues,
            interval,
        }
    }

    /// Produce until shutdown; returns how many messages were sent
    pub async fn run(self, mut shutdown: ShutdownToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0u64;

        info!(
            queues = self.queues.len(),
            broker = %self.broker.name(),
            interval_ms = self.interval.as_millis() as u64,
            "Demo producer started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            for queue in &self.queues {
                let order = DemoOrder {
                    order_id: sent + 1,
                    amount_cents: 100 + (sent * 37) % 10_000,
                };
                let body = match serde_json::to_string(&order) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode demo order");
                        continue;
                    }
                };
                match self.broker.send(queue, body) {
                    Ok(id) => {
                        sent += 1;
                        debug!(queue = %queue, id = %id, "Demo message sent");
                    }
                    Err(e) => warn!(queue = %queue, error = %e, "Demo send failed"),
                }
            }
        }

        info!(sent, "Demo producer stopped");
        sent
    }
}

/// Listener acknowledging every decodable order, except every `nack_every`-th one
pub struct LoggingListener {
    nack_every: u64,
    seen: AtomicU64,
    acked: AtomicU64,
}

impl LoggingListener {
    pub fn new(nack_every: u64) -> Self {
        Self {
            nack_every,
            seen: AtomicU64::new(0),
            acked: AtomicU64::new(0),
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    fn should_ack(&self) -> bool {
        let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        self.nack_every == 0 || n % self.nack_every != 0
    }
}

#[async_trait]
impl MessageListener for LoggingListener {
    async fn consume(
        &self,
        queue: &QueueName,
        messages: &[Message],
    ) -> Result<Vec<ReceiptHandle>, ListenerError> {
        let mut handles = Vec::with_capacity(messages.len());

        for message in messages {
            let order: DemoOrder = match message.body_json() {
                Ok(order) => order,
                Err(e) => {
                    // Left unacked; it comes back after the visibility timeout
                    warn!(queue = %queue, id = %message.id, error = %e, "Undecodable message");
                    self.seen.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            if !self.should_ack() {
                debug!(queue = %queue, id = %message.id, order_id = order.order_id, "Leaving message for redelivery");
                continue;
            }

            debug!(
                queue = %queue,
                id = %message.id,
                order_id = order.order_id,
                amount_cents = order.amount_cents,
                dequeue_count = message.dequeue_count,
                "Order processed"
            );
            handles.push(message.handle);
        }

        self.acked.fetch_add(handles.len() as u64, Ordering::Relaxed);
        Ok(handles)
    }
}
