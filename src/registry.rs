//! Topic registry: the bag of `(filter, node)` pairs recording which
//! cluster node(s) currently have at least one local subscriber for a
//! filter.

use crate::store::{NodeId, Store, Txn};
use crate::topic::Filter;

/// Records that `node` carries the filter, unless that pair is already
/// registered.
pub fn register(txn: &mut Txn, filter: &Filter, node: &NodeId) {
    txn.topic_write(crate::store::TopicRecord {
        filter: filter.as_str().to_owned(),
        node: node.clone(),
    });
}

/// Removes the `(filter, node)` pair, if present.
pub fn unregister(txn: &mut Txn, filter: &Filter, node: &NodeId) {
    txn.topic_delete_object(&crate::store::TopicRecord {
        filter: filter.as_str().to_owned(),
        node: node.clone(),
    });
}

/// True when no node is registered for `filter` (used to decide whether a
/// trie entry may be pruned once its last subscriber disappears).
pub fn is_orphan(txn: &Txn, filter: &Filter) -> bool {
    txn.topic_records(filter.as_str()).is_empty()
}

/// The set of nodes registered for `filter`, via a dirty read (the hot
/// publish path).
pub fn nodes_for_filter(store: &dyn Store, filter: &str) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = store
        .dirty_topic_records(filter)
        .into_iter()
        .map(|r| r.node)
        .collect();
    nodes.sort();
    nodes.dedup();
    nodes
}
