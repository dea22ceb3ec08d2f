//! Local router: runs on the node that owns the matched subscribers for
//! one filter.

use bytes::Bytes;

use crate::fsm::Fsm;
use crate::hooks::HookRegistry;
use crate::message_store::MessageStore;
use crate::names::LocalNames;
use crate::store::{ClientId, Qos, Store};
use crate::topic::RoutingKey;

/// Delivers one publish to every local subscriber of `filter`. `sender` is
/// the originating process; `sender_client` the MQTT client id behind it.
#[allow(clippy::too_many_arguments)]
pub fn deliver_to_filter<N, H, M>(
    store: &dyn Store,
    names: &N,
    message_store: &M,
    hooks: &HookRegistry,
    filter: &str,
    sender: &ClientId,
    sender_client: &ClientId,
    msg_id: Option<u64>,
    routing_key: &RoutingKey,
    payload: Bytes,
    is_retain: bool,
) where
    N: LocalNames<H>,
    H: Fsm + Clone,
    M: MessageStore,
{
    let subscribers = hooks.filter_subscribers(store.dirty_subscriber_records(filter));
    let retained_delete = is_retain && payload.is_empty();

    for sub in subscribers {
        if retained_delete {
            if sub.qos != Qos::AtMostOnce {
                let msg_ref = message_store.store(sender, sender_client, msg_id, routing_key, payload.clone(), sub.qos);
                message_store.deref(msg_ref);
            }
            continue;
        }

        if sub.qos == Qos::AtMostOnce {
            if let Some(handle) = names.lookup(&sub.client_id) {
                handle.deliver(routing_key, payload.clone(), Qos::AtMostOnce, false, is_retain, None);
            }
        } else {
            let msg_ref = message_store.store(sender, sender_client, msg_id, routing_key, payload.clone(), sub.qos);
            match names.lookup(&sub.client_id) {
                Some(handle) => handle.deliver(routing_key, payload.clone(), sub.qos, false, is_retain, Some(msg_ref)),
                None => message_store.defer_deliver(&sub.client_id, sub.qos, msg_ref),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fsm::{ChannelFsm, Delivery};
    use crate::message_store::MemoryMessageStore;
    use crate::names::DashMapNames;
    use crate::store::MemoryStore;
    use crate::subscriptions;
    use crate::topic::Filter;

    fn setup(filter: &str, client_id: &str, qos: Qos) -> (MemoryStore, DashMapNames<ChannelFsm>, MemoryMessageStore, HookRegistry) {
        let store = MemoryStore::new();
        let f = Filter::parse(filter).unwrap();
        store
            .transaction(|txn| subscriptions::add(txn, &f, client_id, qos, &"node1".to_string()))
            .unwrap();
        (store, DashMapNames::new(), MemoryMessageStore::new(), HookRegistry::new())
    }

    #[test]
    fn qos0_delivers_directly_when_bound_and_drops_when_absent() {
        let (store, names, msg_store, hooks) = setup("a/b", "c1", Qos::AtMostOnce);
        let key = RoutingKey::parse("a/b").unwrap();

        // not bound yet: silent drop, no panic.
        deliver_to_filter(&store, &names, &msg_store, &hooks, "a/b", &"sender".to_string(), &"pub1".to_string(), None, &key, Bytes::from_static(b"x"), false);

        let (tx, rx) = flume::unbounded();
        names.bind("c1", ChannelFsm::new(tx));
        deliver_to_filter(&store, &names, &msg_store, &hooks, "a/b", &"sender".to_string(), &"pub1".to_string(), None, &key, Bytes::from_static(b"x"), false);
        assert!(matches!(rx.try_recv().unwrap(), Delivery::Publish { .. }));
    }

    #[test]
    fn qos1_defers_when_not_locally_bound() {
        let (store, names, msg_store, hooks) = setup("a/b", "c1", Qos::AtLeastOnce);
        let key = RoutingKey::parse("a/b").unwrap();
        deliver_to_filter(&store, &names, &msg_store, &hooks, "a/b", &"sender".to_string(), &"pub1".to_string(), None, &key, Bytes::from_static(b"x"), false);

        let (tx, rx) = flume::unbounded();
        let fsm = ChannelFsm::new(tx);
        names.bind("c1", fsm.clone());
        msg_store.deliver_from_store(&"c1".to_string(), &fsm);
        assert!(matches!(rx.try_recv().unwrap(), Delivery::Publish { .. }));
    }

    #[test]
    fn retained_delete_never_delivers_and_derefs_the_store() {
        let (store, names, msg_store, hooks) = setup("a/b", "c1", Qos::AtLeastOnce);
        let key = RoutingKey::parse("a/b").unwrap();
        let (tx, rx) = flume::unbounded();
        names.bind("c1", ChannelFsm::new(tx));

        deliver_to_filter(&store, &names, &msg_store, &hooks, "a/b", &"sender".to_string(), &"pub1".to_string(), None, &key, Bytes::new(), true);
        assert!(rx.try_recv().is_err());
    }
}
