//! Message store contract: retained messages, QoS>0 deferred delivery and
//! session cleanup, all local-node only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::RouterError;
use crate::fsm::Fsm;
use crate::store::{ClientId, Qos};
use crate::topic::RoutingKey;

/// Opaque reference to a stored message, handed back by `store` and passed
/// to `defer_deliver`/`deref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgRef(pub u64);

pub trait MessageStore: Send + Sync {
    /// Delivers any retained message matching `filter` to `process`, at
    /// (at most) `qos`.
    fn deliver_retained(&self, process: &dyn Fsm, filter: &str, qos: Qos);

    /// Replays any messages deferred for `client_id` to `process` — used on
    /// a non-clean-session takeover.
    fn deliver_from_store(&self, client_id: &ClientId, process: &dyn Fsm);

    /// Purges a client's deferred-message session — used on a clean-session
    /// takeover.
    fn clean_session(&self, client_id: &ClientId);

    /// Applies the retained-message side effect of a publish: an empty
    /// payload clears any retained message for `routing_key`. `sender` is
    /// the originating process; `sender_client` the MQTT client id behind
    /// it.
    fn retain_action(&self, sender: &ClientId, sender_client: &ClientId, routing_key: &RoutingKey, payload: Bytes);

    /// Persists a QoS>0 message and returns a reference to it, reusing an
    /// existing reference if this exact `(sender, msg_id)` was already
    /// stored. `sender_client` is carried alongside `sender` for parity
    /// with `retain_action` but is not itself part of the dedup key.
    fn store(&self, sender: &ClientId, sender_client: &ClientId, msg_id: Option<u64>, routing_key: &RoutingKey, payload: Bytes, qos: Qos) -> MsgRef;

    /// Queues `msg_ref` for later delivery to `client_id` because it is not
    /// locally bound right now.
    fn defer_deliver(&self, client_id: &ClientId, qos: Qos, msg_ref: MsgRef);

    /// Releases a stored message once it needs no further delivery
    /// attempts (the retained-delete special case).
    fn deref(&self, msg_ref: MsgRef);
}

#[derive(Clone)]
struct StoredMessage {
    routing_key: RoutingKey,
    payload: Bytes,
    qos: Qos,
    dedup_key: Option<(ClientId, u64)>,
}

#[derive(Default)]
struct Tables {
    next_ref: AtomicU64,
    messages: HashMap<u64, StoredMessage>,
    retained: HashMap<String, (RoutingKey, Bytes)>,
    deferred: HashMap<ClientId, Vec<(Qos, MsgRef)>>,
    dedup: HashMap<(ClientId, u64), MsgRef>,
}

/// In-memory reference [`MessageStore`], used by this crate's own tests.
pub struct MemoryMessageStore {
    tables: Mutex<Tables>,
}

impl MemoryMessageStore {
    pub fn new() -> MemoryMessageStore {
        MemoryMessageStore {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryMessageStore {
    fn default() -> MemoryMessageStore {
        MemoryMessageStore::new()
    }
}

impl MessageStore for MemoryMessageStore {
    fn deliver_retained(&self, process: &dyn Fsm, filter: &str, qos: Qos) {
        let tables = self.tables.lock();
        if let Some((key, payload)) = tables.retained.get(filter) {
            process.deliver(key, payload.clone(), qos, false, true, None);
        }
    }

    fn deliver_from_store(&self, client_id: &ClientId, process: &dyn Fsm) {
        let pending = {
            let mut tables = self.tables.lock();
            tables.deferred.remove(client_id).unwrap_or_default()
        };
        let tables = self.tables.lock();
        for (qos, msg_ref) in pending {
            if let Some(msg) = tables.messages.get(&msg_ref.0) {
                process.deliver(&msg.routing_key, msg.payload.clone(), qos, true, false, Some(msg_ref));
            }
        }
    }

    fn clean_session(&self, client_id: &ClientId) {
        let mut tables = self.tables.lock();
        if let Some(refs) = tables.deferred.remove(client_id) {
            for (_, msg_ref) in refs {
                tables.messages.remove(&msg_ref.0);
            }
        }
    }

    fn retain_action(&self, _sender: &ClientId, _sender_client: &ClientId, routing_key: &RoutingKey, payload: Bytes) {
        let mut tables = self.tables.lock();
        if payload.is_empty() {
            tables.retained.remove(routing_key.as_str());
        } else {
            tables
                .retained
                .insert(routing_key.as_str().to_owned(), (routing_key.clone(), payload));
        }
    }

    fn store(&self, sender: &ClientId, _sender_client: &ClientId, msg_id: Option<u64>, routing_key: &RoutingKey, payload: Bytes, qos: Qos) -> MsgRef {
        let mut tables = self.tables.lock();
        let dedup_key = msg_id.map(|id| (sender.clone(), id));
        if let Some(key) = &dedup_key {
            if let Some(existing) = tables.dedup.get(key) {
                return *existing;
            }
        }

        let id = tables.next_ref.fetch_add(1, Ordering::SeqCst);
        tables.messages.insert(
            id,
            StoredMessage {
                routing_key: routing_key.clone(),
                payload,
                qos,
                dedup_key: dedup_key.clone(),
            },
        );
        let msg_ref = MsgRef(id);
        if let Some(key) = dedup_key {
            tables.dedup.insert(key, msg_ref);
        }
        msg_ref
    }

    fn defer_deliver(&self, client_id: &ClientId, qos: Qos, msg_ref: MsgRef) {
        let mut tables = self.tables.lock();
        tables.deferred.entry(client_id.clone()).or_default().push((qos, msg_ref));
    }

    fn deref(&self, msg_ref: MsgRef) {
        let mut tables = self.tables.lock();
        if let Some(msg) = tables.messages.remove(&msg_ref.0) {
            if let Some(key) = msg.dedup_key {
                tables.dedup.remove(&key);
            }
        }
    }
}
