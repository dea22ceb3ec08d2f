//! Subscription table: the bag of `(filter, qos, client_id)` triples, and
//! the glue that keeps the topic registry and trie in sync with it.

use log::debug;

use crate::error::RouterError;
use crate::registry;
use crate::store::{NodeId, Qos, SubscriberRecord, Txn};
use crate::topic::Filter;
use crate::trie;

/// Upserts `(filter, client_id)` with `qos`, registers `node` as carrying
/// the filter, and ensures the trie has an entry for it.
pub fn add(txn: &mut Txn, filter: &Filter, client_id: &str, qos: Qos, node: &NodeId) -> Result<(), RouterError> {
    txn.subscriber_write(SubscriberRecord {
        filter: filter.as_str().to_owned(),
        client_id: client_id.to_owned(),
        qos,
    });
    registry::register(txn, filter, node);
    trie::insert(txn, filter)?;
    debug!("subscribe client = {client_id} filter = {filter} qos = {}", qos.as_u8());
    Ok(())
}

/// Removes the `(filter, client_id)` record. `is_local` answers whether a
/// given client_id is connected to `node`, i.e. whether any subscribers for
/// `(filter, node)` remain; the caller supplies it because that answer
/// lives in the node-local client registry, not this table.
pub fn remove(
    txn: &mut Txn,
    filter: &Filter,
    client_id: &str,
    node: &NodeId,
    is_local: &dyn Fn(&str) -> bool,
) -> Result<(), RouterError> {
    txn.subscriber_delete(filter.as_str(), client_id);

    let any_local_remaining = txn
        .subscriber_records(filter.as_str())
        .iter()
        .any(|r| is_local(&r.client_id));

    if !any_local_remaining {
        registry::unregister(txn, filter, node);
    }
    if registry::is_orphan(txn, filter) {
        trie::delete(txn, filter)?;
    }
    debug!("unsubscribe client = {client_id} filter = {filter}");
    Ok(())
}

/// Removes every subscription held by `client_id`, across all filters
/// (session cleanup).
pub fn remove_all_for_client(
    txn: &mut Txn,
    client_id: &str,
    node: &NodeId,
    is_local: &dyn Fn(&str) -> bool,
) -> Result<(), RouterError> {
    for record in txn.subscriber_records_for_client(client_id) {
        let filter = Filter::parse(&record.filter)?;
        remove(txn, &filter, client_id, node, is_local)?;
    }
    Ok(())
}
