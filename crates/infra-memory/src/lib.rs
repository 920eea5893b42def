// pullq Infrastructure - In-memory Adapters
// Implements: Transport, Router (with RouteSource), plus the broker they talk to

pub mod broker;
pub mod cluster;
pub mod router;
pub mod transport;

pub use broker::{BrokerConfig, BrokerError, MemoryBroker, QueueStats};
pub use cluster::MemoryCluster;
pub use router::{CachedRouter, RouteSource};
pub use transport::{MemoryTransport, TransportConfig};
