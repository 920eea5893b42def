//! Admission Controller
//!
//! Decides whether a new pull may be issued, based on two signals:
//! - pull attempts admitted but not yet submitted (`in_flight`)
//! - received batches still waiting for a worker (`queue_depth`)
//!
//! Both are plain atomics; the flight counter is updated with a CAS loop so concurrent
//! admissions can never push it past the cap.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Depth of the consume task queue, shared between the worker pool (which moves it)
/// and admission (which reads it)
#[derive(Debug, Clone, Default)]
pub struct QueueDepth(Arc<AtomicUsize>);

impl QueueDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Saturates at zero
    pub fn decrement(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Dual-threshold admission gate
#[derive(Debug)]
pub struct AdmissionController {
    in_flight: AtomicUsize,
    max_flight: usize,
    depth: QueueDepth,
    max_depth: usize,
    closed: AtomicBool,
}

impl AdmissionController {
    /// Create a new admission controller
    ///
    /// # Arguments
    /// * `max_flight` - Cap on admitted-but-unsubmitted pulls
    /// * `max_depth` - Admission stops once this many batches are waiting
    /// * `depth` - Depth gauge maintained by the worker pool
    pub fn new(max_flight: usize, max_depth: usize, depth: QueueDepth) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max_flight,
            depth,
            max_depth,
            closed: AtomicBool::new(false),
        }
    }

    /// Try to admit one pull attempt
    ///
    /// Returns a permit iff `in_flight < max_flight` and `queue_depth < max_depth`
    /// and the controller is open. Denial has no side effect.
    pub fn try_admit(&self) -> Option<FlightPermit<'_>> {
        if self.closed.load(Ordering::Acquire) || self.depth.get() >= self.max_depth {
            return None;
        }

        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max_flight {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(FlightPermit { controller: self }),
                Err(actual) => current = actual, // Retry
            }
        }
    }

    /// Deny every admission from now on
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn queue_depth(&self) -> usize {
        self.depth.get()
    }

    fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// One admitted pull attempt
///
/// Releases its flight slot exactly once, on [`FlightPermit::release`] or drop.
#[derive(Debug)]
#[must_use = "dropping the permit releases the flight slot immediately"]
pub struct FlightPermit<'a> {
    controller: &'a AdmissionController,
}

impl FlightPermit<'_> {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.controller.release();
    }
}
