// Router Port (Interface)
// Resolves which broker addresses currently serve a queue

use crate::domain::{Address, QueueName};
use async_trait::async_trait;
use thiserror::Error;

/// Routing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("No route for queue: {0}")]
    NoRoute(String),

    #[error("Route lookup failed: {0}")]
    Lookup(String),
}

/// Router trait
///
/// Implementations usually cache routes; `mark_stale` drops the cached entry so the
/// next `resolve` fetches it again.
#[async_trait]
pub trait Router: Send + Sync {
    /// Resolve the current address list for a queue
    ///
    /// # Errors
    /// - RouteError::NoRoute if nothing serves the queue
    /// - RouteError::Lookup if the route source could not be reached
    async fn resolve(&self, queue: &QueueName) -> Result<Vec<Address>, RouteError>;

    /// Invalidate the cached route for a queue
    fn mark_stale(&self, queue: &QueueName);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Router returning a fixed address list, optionally failing every lookup
    pub struct StaticRouter {
        addresses: Vec<Address>,
        failing: AtomicBool,
        resolve_count: AtomicUsize,
        stale_count: AtomicUsize,
    }

    impl StaticRouter {
        pub fn new(addresses: Vec<Address>) -> Self {
            Self {
                addresses,
                failing: AtomicBool::new(false),
                resolve_count: AtomicUsize::new(0),
                stale_count: AtomicUsize::new(0),
            }
        }

        pub fn single(address: impl Into<Address>) -> Self {
            Self::new(vec![address.into()])
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn resolve_count(&self) -> usize {
            self.resolve_count.load(Ordering::SeqCst)
        }

        pub fn stale_count(&self) -> usize {
            self.stale_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Router for StaticRouter {
        async fn resolve(&self, queue: &QueueName) -> Result<Vec<Address>, RouteError> {
            self.resolve_count.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(RouteError::Lookup(format!("route source down for {}", queue)));
            }
            Ok(self.addresses.clone())
        }

        fn mark_stale(&self, _queue: &QueueName) {
            self.stale_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
