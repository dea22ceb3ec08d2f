//! Publish dispatcher: match, then either the single-node fast path or a
//! cluster-gated fan-out, run inside a transient worker thread so the
//! caller only waits for acceptance, not delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use log::{debug, error};

use crate::cluster::{ClusterMembership, Rpc};
use crate::error::RouterError;
use crate::fsm::Fsm;
use crate::hooks::HookRegistry;
use crate::local_router;
use crate::match_engine;
use crate::message_store::MessageStore;
use crate::names::LocalNames;
use crate::store::{ClientId, NodeId, Store};
use crate::topic::RoutingKey;

/// Spawns the transient publish worker and returns the completion channel
/// the caller waits on. Returns `RouterError::SystemLimit` immediately,
/// without spawning, if `max_inflight` workers are already running.
#[allow(clippy::too_many_arguments)]
pub fn publish<S, C, R, N, H, M>(
    store: Arc<S>,
    cluster: Arc<C>,
    rpc: Arc<R>,
    names: Arc<N>,
    message_store: Arc<M>,
    hooks: Arc<HookRegistry>,
    inflight: Arc<AtomicUsize>,
    max_inflight: usize,
    local_node: NodeId,
    sender: ClientId,
    sender_client: ClientId,
    msg_id: Option<u64>,
    routing_key: RoutingKey,
    payload: Bytes,
    is_retain: bool,
) -> Result<flume::Receiver<Result<(), RouterError>>, RouterError>
where
    S: Store,
    C: ClusterMembership + 'static,
    R: Rpc + 'static,
    N: LocalNames<H> + 'static,
    H: Fsm + Clone + Send + Sync + 'static,
    M: MessageStore + 'static,
{
    if inflight.fetch_add(1, Ordering::SeqCst) >= max_inflight {
        inflight.fetch_sub(1, Ordering::SeqCst);
        return Err(RouterError::SystemLimit);
    }

    let (done_tx, done_rx) = flume::bounded(1);

    thread::spawn(move || {
        let result = run(
            store.as_ref(),
            cluster.as_ref(),
            rpc.as_ref(),
            names.as_ref(),
            message_store.as_ref(),
            hooks.as_ref(),
            &local_node,
            &sender,
            &sender_client,
            msg_id,
            &routing_key,
            payload,
            is_retain,
        );
        inflight.fetch_sub(1, Ordering::SeqCst);
        if let Err(ref e) = result {
            error!("publish worker failed: {e}");
        }
        let _ = done_tx.send(result);
    });

    Ok(done_rx)
}

/// Blocks the caller until the worker accepts or fails the publish: the
/// caller waits for either the completion signal or the worker's failure.
pub fn await_completion(done_rx: flume::Receiver<Result<(), RouterError>>) -> Result<(), RouterError> {
    done_rx
        .recv()
        .map_err(|_| RouterError::WorkerDown("publish worker channel closed without a reply".into()))?
}

#[allow(clippy::too_many_arguments)]
fn run<S, C, R, N, H, M>(
    store: &S,
    cluster: &C,
    rpc: &R,
    names: &N,
    message_store: &M,
    hooks: &HookRegistry,
    local_node: &NodeId,
    sender: &ClientId,
    sender_client: &ClientId,
    msg_id: Option<u64>,
    routing_key: &RoutingKey,
    payload: Bytes,
    is_retain: bool,
) -> Result<(), RouterError>
where
    S: Store,
    C: ClusterMembership,
    R: Rpc,
    N: LocalNames<H>,
    H: Fsm + Clone,
    M: MessageStore,
{
    let matches = match_engine::match_key(store, routing_key);
    debug!("publish routing_key = {routing_key} matches = {}", matches.len());

    if is_retain {
        cluster.if_ready(|| message_store.retain_action(sender, sender_client, routing_key, payload.clone()))?;
        for (filter, node) in &matches {
            dispatch_one(
                store, rpc, names, message_store, hooks, local_node, node, filter.as_str(), sender, sender_client, msg_id,
                routing_key, payload.clone(), true,
            )?;
        }
        return Ok(());
    }

    let only_local = matches.iter().all(|(_, node)| node == local_node);
    if only_local {
        for (filter, _node) in &matches {
            local_router::deliver_to_filter(
                store, names, message_store, hooks, filter.as_str(), sender, sender_client, msg_id, routing_key,
                payload.clone(), false,
            );
        }
        return Ok(());
    }

    cluster.if_ready(|| ())?;
    for (filter, node) in &matches {
        dispatch_one(
            store, rpc, names, message_store, hooks, local_node, node, filter.as_str(), sender, sender_client, msg_id,
            routing_key, payload.clone(), false,
        )?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn dispatch_one<S, R, N, H, M>(
    store: &S,
    rpc: &R,
    names: &N,
    message_store: &M,
    hooks: &HookRegistry,
    local_node: &NodeId,
    node: &NodeId,
    filter: &str,
    sender: &ClientId,
    sender_client: &ClientId,
    msg_id: Option<u64>,
    routing_key: &RoutingKey,
    payload: Bytes,
    is_retain: bool,
) -> Result<(), RouterError>
where
    S: Store,
    R: Rpc,
    N: LocalNames<H>,
    H: Fsm + Clone,
    M: MessageStore,
{
    if node == local_node {
        local_router::deliver_to_filter(store, names, message_store, hooks, filter, sender, sender_client, msg_id, routing_key, payload, is_retain);
        Ok(())
    } else {
        rpc.call(node, || {
            local_router::deliver_to_filter(store, names, message_store, hooks, filter, sender, sender_client, msg_id, routing_key, payload.clone(), is_retain);
        })
    }
}
