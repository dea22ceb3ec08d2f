//! Plugin convenience triple: a builder that hands a plugin a register,
//! publish and subscribe callable bound to a synthetic client id, without
//! making it run a full client FSM of its own.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use crate::cluster::{ClusterMembership, Rpc};
use crate::error::RouterError;
use crate::fsm::Fsm;
use crate::message_store::MessageStore;
use crate::names::LocalNames;
use crate::router::Router;
use crate::store::{Qos, Store};
use crate::topic::Filter;

/// Base64 of a hash of `caller_tag`, standing in for "hash of the caller
/// handle" since plugins in this crate identify themselves by a tag
/// rather than a connection-layer handle.
fn synthetic_client_id(caller_tag: &str) -> String {
    let mut hasher = DefaultHasher::new();
    caller_tag.hash(&mut hasher);
    STANDARD.encode(hasher.finish().to_be_bytes())
}

/// Builds the register/publish/subscribe triple a plugin uses to talk to
/// the router. `handle` stands in for the plugin's own FSM: it never
/// receives a delivery unless the plugin also subscribes and is bound.
/// All three callables gate on cluster readiness before doing anything
/// else, independent of whatever gating `publish`/`subscribe` apply
/// internally.
#[allow(clippy::type_complexity)]
pub fn plugin_handles<S, C, R, N, H, M>(
    router: Arc<Router<S, C, R, N, H, M>>,
    cluster: Arc<C>,
    caller_tag: &str,
    handle: H,
) -> (
    impl Fn() -> Result<(), RouterError>,
    impl Fn(&str, Bytes) -> Result<(), RouterError>,
    impl Fn(&str) -> Result<(), RouterError>,
)
where
    S: Store,
    C: ClusterMembership + 'static,
    R: Rpc + 'static,
    N: LocalNames<H> + 'static,
    H: Fsm + Clone + Send + Sync + 'static,
    M: MessageStore + 'static,
{
    let client_id = synthetic_client_id(caller_tag);

    let register = {
        let router = Arc::clone(&router);
        let cluster = Arc::clone(&cluster);
        let client_id = client_id.clone();
        let handle = handle.clone();
        move || {
            cluster.if_ready(|| ())?;
            router.register_client(&client_id, handle.clone(), true)
        }
    };

    let publish = {
        let router = Arc::clone(&router);
        let cluster = Arc::clone(&cluster);
        let client_id = client_id.clone();
        move |filter: &str, payload: Bytes| {
            cluster.if_ready(|| ())?;
            router.publish(&client_id, &client_id, None, filter, payload, false)
        }
    };

    let subscribe = {
        let router = Arc::clone(&router);
        let cluster = Arc::clone(&cluster);
        let client_id = client_id.clone();
        move |filter: &str| {
            cluster.if_ready(|| ())?;
            let f = Filter::parse(filter)?;
            router.subscribe(&client_id, vec![(f, Qos::AtMostOnce)])
        }
    };

    (register, publish, subscribe)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cluster::{LoopbackRpc, StaticCluster};
    use crate::config::RouterConfig;
    use crate::fsm::{ChannelFsm, Delivery};
    use crate::hooks::HookRegistry;
    use crate::message_store::MemoryMessageStore;
    use crate::names::DashMapNames;
    use crate::store::MemoryStore;

    fn harness() -> (
        Arc<Router<MemoryStore, StaticCluster, LoopbackRpc, DashMapNames<ChannelFsm>, ChannelFsm, MemoryMessageStore>>,
        Arc<StaticCluster>,
    ) {
        let cluster = Arc::new(StaticCluster::new("node1", vec!["node1".to_string()]));
        let router = Arc::new(Router::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&cluster),
            Arc::new(LoopbackRpc),
            Arc::new(DashMapNames::new()),
            Arc::new(MemoryMessageStore::new()),
            Arc::new(HookRegistry::new()),
            RouterConfig::default(),
        ));
        (router, cluster)
    }

    #[test]
    fn same_tag_always_yields_the_same_client_id() {
        assert_eq!(synthetic_client_id("rule-engine"), synthetic_client_id("rule-engine"));
        assert_ne!(synthetic_client_id("rule-engine"), synthetic_client_id("billing"));
    }

    #[test]
    fn register_then_subscribe_then_publish_round_trips() {
        let (router, cluster) = harness();
        let (tx, rx) = flume::unbounded();
        let (register, publish, subscribe) = plugin_handles(router, cluster, "rule-engine", ChannelFsm::new(tx));

        register().unwrap();
        subscribe("a/b").unwrap();
        publish("a/b", Bytes::from_static(b"hello")).unwrap();

        assert!(matches!(rx.recv().unwrap(), Delivery::Publish { .. }));
    }

    #[test]
    fn all_three_callables_refuse_while_the_cluster_is_not_ready() {
        let (router, cluster) = harness();
        let (tx, _rx) = flume::unbounded();
        let (register, publish, subscribe) = plugin_handles(router, cluster.clone(), "rule-engine", ChannelFsm::new(tx));
        cluster.set_ready(false);

        assert!(matches!(register(), Err(RouterError::NotReady)));
        assert!(matches!(subscribe("a/b"), Err(RouterError::NotReady)));
        assert!(matches!(publish("a/b", Bytes::new()), Err(RouterError::NotReady)));
    }
}
