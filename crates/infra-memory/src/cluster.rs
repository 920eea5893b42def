// Node directory: which addresses exist, which are reachable, which serve a queue

use crate::broker::MemoryBroker;
use crate::router::RouteSource;
use async_trait::async_trait;
use pullq_core::domain::{Address, QueueName};
use pullq_core::port::RouteError;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

#[derive(Default)]
struct Nodes {
    by_address: BTreeMap<Address, Arc<MemoryBroker>>,
    offline: HashSet<Address>,
}

/// Addressable nodes, each fronting a broker store
///
/// Several nodes may front the same store; any of them can serve receives and deletes
/// for its queues. Taking a node offline makes the transport treat its address as
/// unreachable and drops it from routes, without touching the store.
#[derive(Default)]
pub struct MemoryCluster {
    nodes: RwLock<Nodes>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, address: impl Into<Address>, broker: Arc<MemoryBroker>) {
        let address = address.into();
        info!(node = %address, broker = %broker.name(), "Node joined cluster");
        self.write().by_address.insert(address, broker);
    }

    pub fn node(&self, address: &str) -> Option<Arc<MemoryBroker>> {
        self.read().by_address.get(address).cloned()
    }

    /// First reachable node among `addresses`, in the order given
    pub fn reachable(&self, addresses: &[Address]) -> Option<(Address, Arc<MemoryBroker>)> {
        let nodes = self.read();
        addresses
            .iter()
            .filter(|address| !nodes.offline.contains(*address))
            .find_map(|address| {
                nodes
                    .by_address
                    .get(address)
                    .map(|broker| (address.clone(), Arc::clone(broker)))
            })
    }

    pub fn set_online(&self, address: &str, online: bool) {
        let mut nodes = self.write();
        if online {
            nodes.offline.remove(address);
        } else {
            nodes.offline.insert(address.to_string());
        }
        info!(node = %address, online, "Node availability changed");
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.read().by_address.keys().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Nodes> {
        self.nodes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Nodes> {
        self.nodes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RouteSource for MemoryCluster {
    async fn lookup(&self, queue: &QueueName) -> Result<Vec<Address>, RouteError> {
        let nodes = self.read();
        let addresses: Vec<Address> = nodes
            .by_address
            .iter()
            .filter(|(address, broker)| !nodes.offline.contains(*address) && broker.has_queue(queue))
            .map(|(address, _)| address.clone())
            .collect();

        if addresses.is_empty() {
            return Err(RouteError::NoRoute(queue.to_string()));
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerConfig;
    use pullq_core::port::SystemTimeProvider;

    fn broker(name: &str, queues: &[&str]) -> Arc<MemoryBroker> {
        let broker = Arc::new(MemoryBroker::new(
            name,
            BrokerConfig::default(),
            Arc::new(SystemTimeProvider),
        ));
        for queue in queues {
            broker.create_queue(&QueueName::new(*queue).unwrap()).unwrap();
        }
        broker
    }

    #[tokio::test]
    async fn test_lookup_lists_nodes_serving_queue() {
        let cluster = MemoryCluster::new();
        let shared = broker("store-a", &["orders"]);
        cluster.add_node("n-1", shared.clone());
        cluster.add_node("n-2", shared);
        cluster.add_node("n-3", broker("store-b", &["billing"]));

        let orders = cluster.lookup(&QueueName::new("orders").unwrap()).await.unwrap();
        assert_eq!(orders, vec!["n-1".to_string(), "n-2".to_string()]);

        let billing = cluster.lookup(&QueueName::new("billing").unwrap()).await.unwrap();
        assert_eq!(billing, vec!["n-3".to_string()]);

        let missing = cluster.lookup(&QueueName::new("missing").unwrap()).await;
        assert!(matches!(missing, Err(RouteError::NoRoute(_))));
    }

    #[tokio::test]
    async fn test_offline_node_leaves_routes_and_reachability() {
        let cluster = MemoryCluster::new();
        let shared = broker("store-a", &["orders"]);
        cluster.add_node("n-1", shared.clone());
        cluster.add_node("n-2", shared);
        let all = vec!["n-1".to_string(), "n-2".to_string()];

        cluster.set_online("n-1", false);
        assert_eq!(cluster.reachable(&all).unwrap().0, "n-2");
        let orders = cluster.lookup(&QueueName::new("orders").unwrap()).await.unwrap();
        assert_eq!(orders, vec!["n-2".to_string()]);

        cluster.set_online("n-2", false);
        assert!(cluster.reachable(&all).is_none());

        cluster.set_online("n-1", true);
        assert_eq!(cluster.reachable(&all).unwrap().0, "n-1");
    }
}
