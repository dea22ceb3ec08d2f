//! The replicated transactional store.
//!
//! This module is the trait boundary for the "replicated transactional
//! store" external collaborator: `transaction`/`async_dirty`/`read`/
//! `match_object`/`write`/`delete`/`delete_object`/`dirty_read`/
//! `dirty_delete`/`dirty_all_keys`. The reference implementation here
//! (`MemoryStore`) is a single-node, in-process stand-in used by this
//! crate's own tests; a real deployment replaces it with a consensus-backed
//! KV layer without the router-side code changing.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use slab::Slab;

use crate::error::RouterError;

pub type NodeId = String;
pub type ClientId = String;

/// Identifies a trie node: the sentinel root, or a filter-prefix word path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrieNodeId {
    Root,
    Path(Vec<Box<str>>),
}

impl TrieNodeId {
    pub fn extend(&self, word: &str) -> TrieNodeId {
        let mut path = match self {
            TrieNodeId::Root => Vec::new(),
            TrieNodeId::Path(p) => p.clone(),
        };
        path.push(word.into());
        TrieNodeId::Path(path)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrieNode {
    pub edge_count: u32,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieEdge {
    pub from: TrieNodeId,
    pub word: Box<str>,
    pub to: TrieNodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub filter: String,
    pub node: NodeId,
}

/// Delivery guarantee requested by a subscriber. The routing core only
/// ever branches on zero vs. non-zero, but the real value is carried
/// through to the `Fsm`/`MessageStore` collaborators, which do care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl Qos {
    pub fn from_u8(v: u8) -> Option<Qos> {
        match v {
            0 => Some(Qos::AtMostOnce),
            1 => Some(Qos::AtLeastOnce),
            2 => Some(Qos::ExactlyOnce),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub filter: String,
    pub client_id: ClientId,
    pub qos: Qos,
}

#[derive(Default)]
struct Tables {
    nodes: HashMap<TrieNodeId, TrieNode>,
    edges: HashMap<(TrieNodeId, Box<str>), TrieEdge>,
    // bag semantics: multiple records may share a filter key
    topics: Slab<TopicRecord>,
    subscribers: Slab<SubscriberRecord>,
}

/// A live handle into the store for the duration of one `transaction` call.
/// All reads/writes issued through a `Txn` are isolated by the enclosing
/// write lock, giving ACID transactions within a node.
pub struct Txn<'a> {
    tables: &'a mut Tables,
}

impl<'a> Txn<'a> {
    pub fn node_read(&self, id: &TrieNodeId) -> Option<TrieNode> {
        self.tables.nodes.get(id).cloned()
    }

    pub fn node_write(&mut self, id: TrieNodeId, node: TrieNode) {
        self.tables.nodes.insert(id, node);
    }

    pub fn node_delete(&mut self, id: &TrieNodeId) {
        self.tables.nodes.remove(id);
    }

    pub fn edge_read(&self, from: &TrieNodeId, word: &str) -> Option<TrieEdge> {
        self.tables.edges.get(&(from.clone(), Box::from(word))).cloned()
    }

    pub fn edge_write(&mut self, edge: TrieEdge) {
        self.tables
            .edges
            .insert((edge.from.clone(), edge.word.clone()), edge);
    }

    pub fn edge_delete(&mut self, from: &TrieNodeId, word: &str) {
        self.tables.edges.remove(&(from.clone(), Box::from(word)));
    }

    /// `match_object`-style lookup: every topic record for `filter`.
    pub fn topic_records(&self, filter: &str) -> Vec<TopicRecord> {
        self.tables
            .topics
            .iter()
            .filter(|(_, r)| r.filter == filter)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Upsert a `(filter, node)` topic record (idempotent: does nothing if
    /// an identical record already exists).
    pub fn topic_write(&mut self, record: TopicRecord) {
        let exists = self.tables.topics.iter().any(|(_, r)| *r == record);
        if !exists {
            self.tables.topics.insert(record);
        }
    }

    /// `delete_object`: remove one matching topic record, if present.
    pub fn topic_delete_object(&mut self, record: &TopicRecord) {
        if let Some(idx) = self
            .tables
            .topics
            .iter()
            .find(|(_, r)| *r == record)
            .map(|(idx, _)| idx)
        {
            self.tables.topics.remove(idx);
        }
    }

    pub fn subscriber_records(&self, filter: &str) -> Vec<SubscriberRecord> {
        self.tables
            .subscribers
            .iter()
            .filter(|(_, r)| r.filter == filter)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Upsert keyed by `(filter, client_id)`: at most one subscriber record
    /// exists per pair, with QoS replaced on re-subscribe.
    pub fn subscriber_write(&mut self, record: SubscriberRecord) {
        let existing = self.tables.subscribers.iter_mut().find(|(_, r)| {
            r.filter == record.filter && r.client_id == record.client_id
        });
        match existing {
            Some((_, slot)) => slot.qos = record.qos,
            None => {
                self.tables.subscribers.insert(record);
            }
        }
    }

    pub fn subscriber_delete(&mut self, filter: &str, client_id: &str) -> Option<SubscriberRecord> {
        let idx = self.tables.subscribers.iter().find(|(_, r)| {
            r.filter == filter && r.client_id == client_id
        }).map(|(idx, _)| idx);
        idx.map(|idx| self.tables.subscribers.remove(idx))
    }

    /// All subscriber records for a client, across every filter — used by
    /// session wipe / "remove all for client".
    pub fn subscriber_records_for_client(&self, client_id: &str) -> Vec<SubscriberRecord> {
        self.tables
            .subscribers
            .iter()
            .filter(|(_, r)| r.client_id == client_id)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

/// The store trait. `Send + Sync` so it can be shared across the publish
/// worker threads.
pub trait Store: Send + Sync + 'static {
    /// Runs `f` atomically against the store. Mirrors `mnesia:transaction/1`
    /// style calls.
    fn transaction<F, R>(&self, f: F) -> Result<R, RouterError>
    where
        F: FnOnce(&mut Txn) -> Result<R, RouterError>;

    /// Non-locking dirty read, used on the hot match/deliver paths.
    fn dirty_topic_records(&self, filter: &str) -> Vec<TopicRecord>;

    fn dirty_subscriber_records(&self, filter: &str) -> Vec<SubscriberRecord>;

    fn dirty_node(&self, id: &TrieNodeId) -> Option<TrieNode>;

    fn dirty_edge(&self, from: &TrieNodeId, word: &str) -> Option<TrieEdge>;

    /// All known filter keys across the subscriber table (`dirty_all_keys`).
    fn dirty_all_filters(&self) -> Vec<String>;

    /// Admin-only: drops all four tables.
    fn reset(&self);
}

/// Single-node, in-process reference implementation of [`Store`].
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> MemoryStore {
        MemoryStore::new()
    }
}

impl Store for MemoryStore {
    fn transaction<F, R>(&self, f: F) -> Result<R, RouterError>
    where
        F: FnOnce(&mut Txn) -> Result<R, RouterError>,
    {
        let mut guard = self.tables.write();
        let mut txn = Txn { tables: &mut guard };
        f(&mut txn)
    }

    fn dirty_topic_records(&self, filter: &str) -> Vec<TopicRecord> {
        let guard = self.tables.read();
        guard
            .topics
            .iter()
            .filter(|(_, r)| r.filter == filter)
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn dirty_subscriber_records(&self, filter: &str) -> Vec<SubscriberRecord> {
        let guard = self.tables.read();
        guard
            .subscribers
            .iter()
            .filter(|(_, r)| r.filter == filter)
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn dirty_node(&self, id: &TrieNodeId) -> Option<TrieNode> {
        self.tables.read().nodes.get(id).cloned()
    }

    fn dirty_edge(&self, from: &TrieNodeId, word: &str) -> Option<TrieEdge> {
        self.tables
            .read()
            .edges
            .get(&(from.clone(), Box::from(word)))
            .cloned()
    }

    fn dirty_all_filters(&self) -> Vec<String> {
        let guard = self.tables.read();
        let mut filters: Vec<String> = guard.subscribers.iter().map(|(_, r)| r.filter.clone()).collect();
        filters.sort();
        filters.dedup();
        filters
    }

    fn reset(&self) {
        let mut guard = self.tables.write();
        *guard = Tables::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subscriber_upsert_replaces_qos() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| {
                txn.subscriber_write(SubscriberRecord {
                    filter: "a/b".into(),
                    client_id: "c1".into(),
                    qos: Qos::AtMostOnce,
                });
                txn.subscriber_write(SubscriberRecord {
                    filter: "a/b".into(),
                    client_id: "c1".into(),
                    qos: Qos::AtLeastOnce,
                });
                Ok(())
            })
            .unwrap();

        let records = store.dirty_subscriber_records("a/b");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].qos, Qos::AtLeastOnce);
    }

    #[test]
    fn topic_record_upsert_is_idempotent() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| {
                txn.topic_write(TopicRecord { filter: "a/b".into(), node: "n1".into() });
                txn.topic_write(TopicRecord { filter: "a/b".into(), node: "n1".into() });
                Ok(())
            })
            .unwrap();
        assert_eq!(store.dirty_topic_records("a/b").len(), 1);
    }

    #[test]
    fn reset_clears_all_tables() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| {
                txn.topic_write(TopicRecord { filter: "a".into(), node: "n1".into() });
                txn.subscriber_write(SubscriberRecord { filter: "a".into(), client_id: "c".into(), qos: Qos::AtMostOnce });
                Ok(())
            })
            .unwrap();
        store.reset();
        assert!(store.dirty_topic_records("a").is_empty());
        assert!(store.dirty_subscriber_records("a").is_empty());
    }
}
