// Port Layer - Interfaces for external collaborators

pub mod failure_reporter;
pub mod listener;
pub mod router;
pub mod sequence;
pub mod time_provider; // For deterministic testing
pub mod transport;

// Re-exports
pub use failure_reporter::{ConsumerFailure, FailureReporter, SubmitError, TracingFailureReporter};
pub use listener::{ListenerError, MessageListener};
pub use router::{RouteError, Router};
pub use sequence::{AtomicSequence, SequenceProvider};
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use transport::{PendingDelete, PendingReceive, Transport, TransportError};
