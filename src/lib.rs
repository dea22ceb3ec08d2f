//! Replicated topic trie, subscription table and cluster-coordinated
//! publish path for an MQTT broker's routing core.

pub mod cluster;
pub mod config;
pub mod error;
pub mod fsm;
pub mod hooks;
pub mod local_router;
pub mod match_engine;
pub mod message_store;
pub mod metrics;
pub mod names;
pub mod plugin;
pub mod publish;
pub mod register;
pub mod registry;
pub mod router;
pub mod store;
pub mod subscriptions;
pub mod topic;
pub mod trie;

pub use cluster::{ClusterMembership, LoopbackRpc, Rpc, StaticCluster};
pub use config::RouterConfig;
pub use error::{RouterError, SubscribeOutcome};
pub use fsm::{ChannelFsm, Delivery, Fsm};
pub use hooks::{Hook, HookRegistry};
pub use message_store::{MemoryMessageStore, MessageStore, MsgRef};
pub use metrics::RegistryMetrics;
pub use names::{DashMapNames, LocalNames};
pub use plugin::plugin_handles;
pub use router::Router;
pub use store::{ClientId, MemoryStore, NodeId, Qos, Store, SubscriberRecord};
pub use topic::{Filter, RoutingKey, Word};
