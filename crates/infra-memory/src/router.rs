// Caching Router: remembers routes until marked stale or expired

use async_trait::async_trait;
use pullq_core::domain::{Address, QueueName};
use pullq_core::port::{RouteError, Router, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, trace};

/// Where routes come from (a name server, a cluster directory, ...)
#[async_trait]
pub trait RouteSource: Send + Sync {
    async fn lookup(&self, queue: &QueueName) -> Result<Vec<Address>, RouteError>;
}

#[derive(Debug, Clone)]
struct CachedRoute {
    addresses: Vec<Address>,
    fetched_at: i64,
}

pub struct CachedRouter {
    source: Arc<dyn RouteSource>,
    clock: Arc<dyn TimeProvider>,
    ttl: Option<Duration>,
    cache: RwLock<HashMap<QueueName, CachedRoute>>,
}

impl CachedRouter {
    /// Router whose entries live until `mark_stale`
    pub fn new(source: Arc<dyn RouteSource>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            source,
            clock,
            ttl: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Also refetch entries older than `ttl`
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn cached(&self, queue: &QueueName) -> Option<Vec<Address>> {
        self.fresh(queue, self.clock.now_millis())
    }

    fn fresh(&self, queue: &QueueName, now: i64) -> Option<Vec<Address>> {
        let cache = self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let route = cache.get(queue)?;
        match self.ttl {
            Some(ttl) if now - route.fetched_at >= ttl.as_millis() as i64 => None,
            _ => Some(route.addresses.clone()),
        }
    }
}

#[async_trait]
impl Router for CachedRouter {
    async fn resolve(&self, queue: &QueueName) -> Result<Vec<Address>, RouteError> {
        let now = self.clock.now_millis();
        if let Some(addresses) = self.fresh(queue, now) {
            trace!(queue = %queue, "Route cache hit");
            return Ok(addresses);
        }

        let addresses = self.source.lookup(queue).await?;
        if addresses.is_empty() {
            return Err(RouteError::NoRoute(queue.to_string()));
        }

        debug!(queue = %queue, addresses = ?addresses, "Route fetched");
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                queue.clone(),
                CachedRoute {
                    addresses: addresses.clone(),
                    fetched_at: now,
                },
            );
        Ok(addresses)
    }

    fn mark_stale(&self, queue: &QueueName) {
        let removed = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(queue);
        if removed.is_some() {
            debug!(queue = %queue, "Route marked stale");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pullq_core::port::time_provider::mocks::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingSource {
        lookups: AtomicUsize,
        answer: Mutex<Result<Vec<Address>, RouteError>>,
    }

    impl CountingSource {
        fn new(addresses: &[&str]) -> Self {
            Self {
                lookups: AtomicUsize::new(0),
                answer: Mutex::new(Ok(addresses.iter().map(|a| a.to_string()).collect())),
            }
        }

        fn set_answer(&self, answer: Result<Vec<Address>, RouteError>) {
            *self.answer.lock().unwrap() = answer;
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RouteSource for CountingSource {
        async fn lookup(&self, _queue: &QueueName) -> Result<Vec<Address>, RouteError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.answer.lock().unwrap().clone()
        }
    }

    fn queue() -> QueueName {
        QueueName::new("orders").unwrap()
    }

    #[tokio::test]
    async fn test_refetches_only_after_mark_stale() {
        let source = Arc::new(CountingSource::new(&["b-1"]));
        let router = CachedRouter::new(source.clone(), Arc::new(ManualClock::new(0)));

        for _ in 0..5 {
            assert_eq!(router.resolve(&queue()).await.unwrap(), vec!["b-1".to_string()]);
        }
        assert_eq!(source.lookups(), 1);

        source.set_answer(Ok(vec!["b-2".to_string()]));
        router.mark_stale(&queue());
        assert_eq!(router.resolve(&queue()).await.unwrap(), vec!["b-2".to_string()]);
        assert_eq!(source.lookups(), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_refetches() {
        let clock = Arc::new(ManualClock::new(0));
        let source = Arc::new(CountingSource::new(&["b-1"]));
        let router =
            CachedRouter::new(source.clone(), clock.clone()).with_ttl(Duration::from_secs(10));

        router.resolve(&queue()).await.unwrap();
        clock.advance_millis(9_999);
        router.resolve(&queue()).await.unwrap();
        assert_eq!(source.lookups(), 1);

        clock.advance_millis(1);
        router.resolve(&queue()).await.unwrap();
        assert_eq!(source.lookups(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let source = Arc::new(CountingSource::new(&[]));
        let router = CachedRouter::new(source.clone(), Arc::new(ManualClock::new(0)));

        assert!(matches!(
            router.resolve(&queue()).await,
            Err(RouteError::NoRoute(_))
        ));

        source.set_answer(Err(RouteError::Lookup("name server down".to_string())));
        assert!(matches!(
            router.resolve(&queue()).await,
            Err(RouteError::Lookup(_))
        ));
        assert!(router.cached(&queue()).is_none());
        assert_eq!(source.lookups(), 2);
    }
}
