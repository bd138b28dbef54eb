//! Consistency across every replica node behind a replica endpoint.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tandem_cache::{PassThroughCache, SuppliedCache};
use tandem_core::{
    ConsistencyTracker, Handle, HandleSupplier, ReplicaDiscovery, ReplicaNode, TandemResult,
};
use tracing::{debug, warn};

/// A replica endpoint may balance reads over several nodes, so a read is
/// only safe when every node has caught up.
///
/// Each node is checked with the wrapped single-replica tracker. Handles
/// the wrapped tracker opens to a node are closed once the check is done.
/// A failed discovery answers "inconsistent". So does a discovery that
/// returns no nodes at all: with nothing to check, nothing is known to have
/// caught up, and the read goes to main.
pub struct ClusterConsistency {
    inner: Arc<dyn ConsistencyTracker>,
    discovery: Arc<dyn ReplicaDiscovery>,
    nodes: Arc<dyn SuppliedCache<Vec<ReplicaNode>>>,
}

impl ClusterConsistency {
    pub fn new(inner: Arc<dyn ConsistencyTracker>, discovery: Arc<dyn ReplicaDiscovery>) -> Self {
        Self {
            inner,
            discovery,
            nodes: Arc::new(PassThroughCache::<Vec<ReplicaNode>>::new()),
        }
    }

    /// Cache discovery results, e.g. in a timed single-flight cache.
    pub fn with_discovery_cache(mut self, nodes: Arc<dyn SuppliedCache<Vec<ReplicaNode>>>) -> Self {
        self.nodes = nodes;
        self
    }

    fn discover(&self, replica: &dyn HandleSupplier) -> Option<Vec<ReplicaNode>> {
        let discovery = &self.discovery;
        match self.nodes.get(&mut || discovery.list_replica_nodes(replica)) {
            Ok(Some(nodes)) if !nodes.is_empty() => Some(nodes),
            // no nodes is not "every node caught up"
            Ok(_) => {
                warn!("no replica nodes known");
                None
            }
            Err(e) => {
                warn!(error = %e, "replica discovery failed");
                None
            }
        }
    }

    fn node_consistent(&self, node: &ReplicaNode) -> bool {
        let opened: RefCell<Option<Handle>> = RefCell::new(None);
        let supplier = || -> TandemResult<Handle> {
            let existing = opened.borrow().clone();
            if let Some(handle) = existing {
                return Ok(handle);
            }
            let handle = node.connect()?;
            *opened.borrow_mut() = Some(handle.clone());
            Ok(handle)
        };

        let consistent = self.inner.is_consistent(&supplier);
        debug!(replica = node.id(), consistent, "checked replica node");

        if let Some(handle) = opened.into_inner() {
            if let Err(e) = handle.close() {
                warn!(replica = node.id(), error = %e, "failed to close replica node handle");
            }
        }
        consistent
    }
}

impl ConsistencyTracker for ClusterConsistency {
    fn write(&self, main: &Handle) {
        self.inner.write(main);
    }

    fn pre_commit(&self, main: &Handle) {
        self.inner.pre_commit(main);
    }

    fn is_consistent(&self, replica: &dyn HandleSupplier) -> bool {
        match self.discover(replica) {
            Some(nodes) => nodes.iter().all(|node| self.node_consistent(node)),
            None => false,
        }
    }
}

impl fmt::Debug for ClusterConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConsistency")
            .field("known_nodes", &self.nodes.last().map(|nodes| nodes.len()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_test_utils::assertions::assert_all_closed;
    use tandem_test_utils::{
        CircularConsistency, HandleKind, MockCluster, MockConnection, StaticDiscovery,
        SwitchableConsistency,
    };

    fn endpoint() -> impl Fn() -> TandemResult<Handle> {
        || -> TandemResult<Handle> {
            Ok(Handle::replica(Arc::new(MockConnection::new(
                "endpoint",
                HandleKind::Replica,
            ))))
        }
    }

    fn cluster(answers: Vec<bool>, nodes: usize) -> (MockCluster, ClusterConsistency) {
        let mock = MockCluster::with_nodes(nodes);
        let tracker = ClusterConsistency::new(
            Arc::new(CircularConsistency::new(answers).touching_replica()),
            Arc::new(StaticDiscovery::new(mock.nodes())),
        );
        (mock, tracker)
    }

    #[test]
    fn test_consistent_when_all_nodes_consistent() {
        let (mock, tracker) = cluster(vec![true, true, true], 3);
        assert!(tracker.is_consistent(&endpoint()));
        assert_eq!(mock.opened().len(), 3);
        assert_all_closed(&mock.opened());
    }

    #[test]
    fn test_inconsistent_when_one_node_lags() {
        let (mock, tracker) = cluster(vec![true, false, true], 3);
        assert!(!tracker.is_consistent(&endpoint()));
        assert_all_closed(&mock.opened());
    }

    #[test]
    fn test_failed_discovery_is_inconsistent() {
        let tracker = ClusterConsistency::new(
            Arc::new(SwitchableConsistency::consistent()),
            Arc::new(StaticDiscovery::failing()),
        );
        assert!(!tracker.is_consistent(&endpoint()));
    }

    #[test]
    fn test_empty_cluster_is_inconsistent() {
        let tracker = ClusterConsistency::new(
            Arc::new(SwitchableConsistency::consistent()),
            Arc::new(StaticDiscovery::new(Vec::new())),
        );
        assert!(!tracker.is_consistent(&endpoint()));
    }

    #[test]
    fn test_writes_reach_inner_tracker() {
        let inner = Arc::new(SwitchableConsistency::consistent());
        let tracker = ClusterConsistency::new(
            inner.clone(),
            Arc::new(StaticDiscovery::new(Vec::new())),
        );
        let main = Handle::main(Arc::new(MockConnection::new("main", HandleKind::Main)));
        tracker.write(&main);
        tracker.pre_commit(&main);
        assert_eq!(inner.writes(), 1);
        assert_eq!(inner.pre_commits(), 1);
    }

    #[test]
    fn test_discovery_cache_is_used() {
        let mock = MockCluster::with_nodes(2);
        let discovery = Arc::new(StaticDiscovery::new(mock.nodes()));
        let cache = Arc::new(tandem_cache::SingleFlightCache::<Vec<ReplicaNode>>::new());
        let tracker = ClusterConsistency::new(
            Arc::new(SwitchableConsistency::consistent()),
            discovery.clone(),
        )
        .with_discovery_cache(cache.clone());

        assert!(tracker.is_consistent(&endpoint()));
        assert_eq!(discovery.calls(), 1);
        assert_eq!(cache.last().map(|nodes| nodes.len()), Some(2));
    }
}
