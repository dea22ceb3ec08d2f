//! Cluster membership and RPC: the two collaborators the publish dispatcher
//! and register/takeover protocol use to reach other nodes.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::RouterError;
use crate::store::NodeId;

/// Answers "who else is in the cluster" and gates calls on readiness.
pub trait ClusterMembership: Send + Sync {
    fn nodes(&self) -> Vec<NodeId>;
    fn local_node(&self) -> NodeId;

    /// Runs `f` only while the cluster is ready; otherwise
    /// `RouterError::NotReady`. Both publish and the plugin convenience
    /// triple gate on this.
    fn if_ready<F, R>(&self, f: F) -> Result<R, RouterError>
    where
        F: FnOnce() -> R;
}

/// Dispatches a closure to run against another node. The reference
/// implementation just runs it in-process; a real transport would
/// serialize the call and run it on the far side.
pub trait Rpc: Send + Sync {
    fn call<F, R>(&self, node: &NodeId, f: F) -> Result<R, RouterError>
    where
        F: FnOnce() -> R;
}

/// Fixed node list with toggleable readiness, for partition-simulation
/// tests.
pub struct StaticCluster {
    local: NodeId,
    nodes: Vec<NodeId>,
    ready: AtomicBool,
}

impl StaticCluster {
    pub fn new(local: impl Into<NodeId>, nodes: Vec<NodeId>) -> StaticCluster {
        StaticCluster {
            local: local.into(),
            nodes,
            ready: AtomicBool::new(true),
        }
    }

    /// Simulates a network partition: while not ready, `if_ready` rejects
    /// with `RouterError::NotReady`.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl ClusterMembership for StaticCluster {
    fn nodes(&self) -> Vec<NodeId> {
        self.nodes.clone()
    }

    fn local_node(&self) -> NodeId {
        self.local.clone()
    }

    fn if_ready<F, R>(&self, f: F) -> Result<R, RouterError>
    where
        F: FnOnce() -> R,
    {
        if self.ready.load(Ordering::SeqCst) {
            Ok(f())
        } else {
            Err(RouterError::NotReady)
        }
    }
}

/// In-process reference RPC: every "remote" call just runs `f` directly,
/// simulating what a wire transport would do without one.
pub struct LoopbackRpc;

impl Rpc for LoopbackRpc {
    fn call<F, R>(&self, _node: &NodeId, f: F) -> Result<R, RouterError>
    where
        F: FnOnce() -> R,
    {
        Ok(f())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn if_ready_runs_the_closure_while_ready() {
        let cluster = StaticCluster::new("node1", vec!["node1".to_string(), "node2".to_string()]);
        assert_eq!(cluster.if_ready(|| 42).unwrap(), 42);
    }

    #[test]
    fn if_ready_rejects_once_marked_unready() {
        let cluster = StaticCluster::new("node1", vec!["node1".to_string()]);
        cluster.set_ready(false);
        assert!(matches!(cluster.if_ready(|| ()), Err(RouterError::NotReady)));
    }

    #[test]
    fn loopback_rpc_runs_in_process() {
        let rpc = LoopbackRpc;
        let result: i32 = rpc.call(&"node2".to_string(), || 7).unwrap();
        assert_eq!(result, 7);
    }
}
