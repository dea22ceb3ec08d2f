//! Per-node register/takeover step: evict any incumbent, apply
//! clean-session semantics, and install the new binding. The cluster-wide
//! broadcast lives in `router.rs`, which is where the `ClusterMembership`/
//! `Rpc` collaborators are held alongside this.

use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::error::RouterError;
use crate::fsm::Fsm;
use crate::message_store::MessageStore;
use crate::names::LocalNames;
use crate::store::{NodeId, Store};
use crate::subscriptions;

/// Runs the local half of a takeover on one node. `is_local` is reused by
/// [`crate::subscriptions::remove_all_for_client`] for the clean-session
/// subscriber wipe.
pub fn register_local<S, H, N, M>(
    store: &S,
    names: &N,
    message_store: &M,
    node: &NodeId,
    client_id: &str,
    handle: H,
    clean_session: bool,
    poll_interval: Duration,
) -> Result<(), RouterError>
where
    S: Store,
    H: Fsm + Clone + Send + Sync + 'static,
    N: LocalNames<H>,
{
    if let Some(incumbent) = names.lookup(client_id) {
        warn!("register client = {client_id}: evicting incumbent");
        incumbent.disconnect();
        while names.contains(client_id) {
            thread::sleep(poll_interval);
        }
    }

    if clean_session {
        message_store.clean_session(client_id);
        store.transaction(|txn| {
            subscriptions::remove_all_for_client(txn, client_id, node, &|id| names.contains(id))
        })?;
    }

    if names.contains(client_id) {
        return Err(RouterError::invariant(format!(
            "binding collision for client {client_id} during takeover"
        )));
    }
    names.bind(client_id, handle.clone());

    if !clean_session {
        message_store.deliver_from_store(client_id, &handle);
    }

    info!("register client = {client_id} node = {node} clean_session = {clean_session}");
    Ok(())
}
