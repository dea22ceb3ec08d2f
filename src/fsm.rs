//! FSM contract: what a connected client process looks like from the
//! router's point of view.

use bytes::Bytes;

use crate::message_store::MsgRef;
use crate::store::Qos;
use crate::topic::RoutingKey;

/// A handle onto a connected client's process. Implementors wrap whatever
/// the connection layer gives the router — the reference implementation
/// wraps a `flume::Sender`; a real deployment's handle might wrap a
/// oneshot-per-frame actor mailbox or a trait object over a transport.
pub trait Fsm: Send + Sync {
    /// Tells the client process to disconnect. Used during takeover to
    /// evict an incumbent before a new binding is installed.
    fn disconnect(&self);

    /// Hands a message off to the client process for delivery.
    #[allow(clippy::too_many_arguments)]
    fn deliver(&self, key: &RoutingKey, payload: Bytes, qos: Qos, dup: bool, retain: bool, msg_ref: Option<MsgRef>);
}

/// What gets sent down a [`ChannelFsm`]'s channel; the reference client
/// process reads these off the receiving end of the same `flume` channel.
#[derive(Debug, Clone)]
pub enum Delivery {
    Disconnect,
    Publish {
        key: RoutingKey,
        payload: Bytes,
        qos: Qos,
        dup: bool,
        retain: bool,
        msg_ref: Option<MsgRef>,
    },
}

/// Reference `Fsm` implementation: a `flume::Sender<Delivery>` standing in
/// for a live connection's mailbox.
#[derive(Clone)]
pub struct ChannelFsm {
    tx: flume::Sender<Delivery>,
}

impl ChannelFsm {
    pub fn new(tx: flume::Sender<Delivery>) -> ChannelFsm {
        ChannelFsm { tx }
    }
}

impl Fsm for ChannelFsm {
    fn disconnect(&self) {
        let _ = self.tx.send(Delivery::Disconnect);
    }

    fn deliver(&self, key: &RoutingKey, payload: Bytes, qos: Qos, dup: bool, retain: bool, msg_ref: Option<MsgRef>) {
        let _ = self.tx.send(Delivery::Publish {
            key: key.clone(),
            payload,
            qos,
            dup,
            retain,
            msg_ref,
        });
    }
}
