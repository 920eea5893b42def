//! Consumer - one subscription per queue, sharing ports and configuration

use crate::application::config::ConsumerConfig;
use crate::application::subscription::{ConsumerPorts, Subscription, SubscriptionStats};
use crate::domain::QueueName;
use crate::error::{ConsumerError, Result};
use crate::port::MessageListener;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct Consumer {
    ports: ConsumerPorts,
    config: ConsumerConfig,
    subscriptions: Mutex<HashMap<QueueName, Subscription>>,
}

impl Consumer {
    /// # Errors
    /// - ConsumerError::Config if `config` is invalid
    pub fn new(ports: ConsumerPorts, config: ConsumerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ports,
            config,
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Start consuming `queue` with `listener`
    ///
    /// # Errors
    /// - ConsumerError::AlreadySubscribed if the queue already has a listener
    /// - ConsumerError::NoRuntime outside a tokio runtime
    pub async fn subscribe(
        &self,
        queue: QueueName,
        listener: Arc<dyn MessageListener>,
    ) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&queue) {
            return Err(ConsumerError::AlreadySubscribed(queue));
        }

        let subscription = Subscription::new(queue.clone(), listener, &self.ports, &self.config)?;
        subscription.start()?;
        subscriptions.insert(queue.clone(), subscription);

        info!(queue = %queue, subscriptions = subscriptions.len(), "Subscribed");
        Ok(())
    }

    /// Stop consuming `queue`
    ///
    /// # Errors
    /// - ConsumerError::NotSubscribed if nothing consumes the queue
    pub async fn unsubscribe(&self, queue: &QueueName) -> Result<()> {
        let subscription = self
            .subscriptions
            .lock()
            .await
            .remove(queue)
            .ok_or_else(|| ConsumerError::NotSubscribed(queue.clone()))?;
        subscription.shutdown();

        info!(queue = %queue, "Unsubscribed");
        Ok(())
    }

    pub async fn is_subscribed(&self, queue: &QueueName) -> bool {
        self.subscriptions.lock().await.contains_key(queue)
    }

    /// Subscribed queues, sorted by name
    pub async fn queues(&self) -> Vec<QueueName> {
        let mut queues: Vec<QueueName> =
            self.subscriptions.lock().await.keys().cloned().collect();
        queues.sort();
        queues
    }

    pub async fn stats(&self) -> Vec<SubscriptionStats> {
        let mut stats: Vec<SubscriptionStats> = self
            .subscriptions
            .lock()
            .await
            .values()
            .map(Subscription::stats)
            .collect();
        stats.sort_by(|a, b| a.queue.cmp(&b.queue));
        stats
    }

    /// Shut every subscription down and forget them
    pub async fn shutdown(&self) {
        let drained: Vec<Subscription> = self
            .subscriptions
            .lock()
            .await
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();

        for subscription in &drained {
            subscription.shutdown();
        }
        info!(stopped = drained.len(), "Consumer shut down");
    }
}
