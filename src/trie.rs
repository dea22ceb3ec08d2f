//! Replicated, wildcard-aware prefix index over topic filters.

use std::collections::HashSet;

use log::trace;

use crate::error::RouterError;
use crate::store::{Store, TrieNodeId, Txn};
use crate::topic::{Filter, RoutingKey, Word};

fn word_str(word: &Word) -> String {
    word.to_string()
}

/// The node-id sequence from `Root` to the filter's terminal node, inclusive
/// of both ends. `node_ids(f)[0] == Root`, `node_ids(f).last()` is the
/// terminal node for `f`.
fn node_ids(words: &[Word]) -> Vec<TrieNodeId> {
    let mut ids = Vec::with_capacity(words.len() + 1);
    let mut cur = TrieNodeId::Root;
    ids.push(cur.clone());
    for w in words {
        cur = cur.extend(&word_str(w));
        ids.push(cur.clone());
    }
    ids
}

/// Inserts `filter` into the trie. Idempotent: re-inserting the same filter
/// is a no-op.
pub fn insert(txn: &mut Txn, filter: &Filter) -> Result<(), RouterError> {
    let ids = node_ids(filter.words());
    let terminal = ids.last().expect("node_ids is never empty").clone();

    if let Some(node) = txn.node_read(&terminal) {
        if node.topic.as_deref() == Some(filter.as_str()) {
            return Ok(());
        }
        if node.topic.is_none() {
            let mut node = node;
            node.topic = Some(filter.as_str().to_owned());
            txn.node_write(terminal, node);
            return Ok(());
        }
    }

    for i in 0..filter.words().len() {
        let from = ids[i].clone();
        let to = ids[i + 1].clone();
        let word = word_str(&filter.words()[i]);

        if txn.edge_read(&from, &word).is_none() {
            txn.edge_write(crate::store::TrieEdge {
                from: from.clone(),
                word: word.clone().into(),
                to,
            });
            let mut from_node = txn.node_read(&from).unwrap_or_default();
            from_node.edge_count += 1;
            txn.node_write(from, from_node);
        }
    }

    let mut terminal_node = txn.node_read(&terminal).unwrap_or_default();
    terminal_node.topic = Some(filter.as_str().to_owned());
    txn.node_write(terminal, terminal_node);
    trace!("trie insert filter = {}", filter);
    Ok(())
}

/// Removes `filter` from the trie, pruning leaf-up. Caller is responsible
/// for only calling this once no subscriber or topic record for `filter`
/// remains anywhere.
pub fn delete(txn: &mut Txn, filter: &Filter) -> Result<(), RouterError> {
    let ids = node_ids(filter.words());
    let terminal = ids.last().expect("node_ids is never empty").clone();

    let terminal_node = txn
        .node_read(&terminal)
        .ok_or_else(|| RouterError::invariant("trie node missing at delete"))?;

    if terminal_node.edge_count == 0 {
        txn.node_delete(&terminal);

        for i in (0..filter.words().len()).rev() {
            let from = ids[i].clone();
            let word = word_str(&filter.words()[i]);
            txn.edge_delete(&from, &word);

            let mut from_node = txn
                .node_read(&from)
                .ok_or_else(|| RouterError::invariant("trie node missing during delete walk"))?;

            if from_node.edge_count == 1 && from_node.topic.is_none() {
                txn.node_delete(&from);
                continue;
            } else if from_node.edge_count == 1 && from_node.topic.is_some() {
                from_node.edge_count = 0;
                txn.node_write(from, from_node);
                break;
            } else {
                from_node.edge_count -= 1;
                txn.node_write(from, from_node);
                break;
            }
        }
    } else {
        let mut terminal_node = terminal_node;
        terminal_node.topic = None;
        txn.node_write(terminal, terminal_node);
    }

    trace!("trie delete filter = {}", filter);
    Ok(())
}

/// Matches a routing key against the trie, returning the deduplicated set
/// of subscribed filter strings whose pattern matches it. Uses dirty
/// reads, the same as the rest of the hot publish path.
pub fn match_routing_key(store: &dyn Store, key: &RoutingKey) -> Vec<String> {
    let mut results = HashSet::new();
    match_rec(store, &TrieNodeId::Root, key.words(), &mut results);
    results.into_iter().collect()
}

fn match_rec(store: &dyn Store, current: &TrieNodeId, words: &[Box<str>], results: &mut HashSet<String>) {
    if let Some(edge) = store.dirty_edge(current, "#") {
        if let Some(node) = store.dirty_node(&edge.to) {
            if let Some(topic) = node.topic {
                results.insert(topic);
            }
        }
    }

    match words.split_first() {
        None => {
            if let Some(node) = store.dirty_node(current) {
                if let Some(topic) = node.topic {
                    results.insert(topic);
                }
            }
        }
        Some((w, rest)) => {
            if let Some(edge) = store.dirty_edge(current, w) {
                match_rec(store, &edge.to, rest, results);
            }
            if let Some(edge) = store.dirty_edge(current, "+") {
                match_rec(store, &edge.to, rest, results);
            }
        }
    }
}
