//! Match engine: trie-match a routing key, then fan each matched filter out
//! to the nodes registered for it.

use crate::registry;
use crate::store::{NodeId, Store};
use crate::topic::{Filter, RoutingKey};
use crate::trie;

/// `(filter, node)` pairs for every subscribed filter matching `key`. May
/// contain duplicate filters if the same filter is hosted on more than one
/// node — callers iterate all of them.
pub fn match_key(store: &dyn Store, key: &RoutingKey) -> Vec<(Filter, NodeId)> {
    let mut pairs = Vec::new();
    for filter_str in trie::match_routing_key(store, key) {
        let filter = match Filter::parse(&filter_str) {
            Ok(f) => f,
            Err(_) => continue,
        };
        for node in registry::nodes_for_filter(store, &filter_str) {
            pairs.push((filter.clone(), node));
        }
    }
    pairs
}
