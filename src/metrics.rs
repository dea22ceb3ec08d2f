//! Point-in-time counters over the replicated tables: ambient observability,
//! not one of the named routing operations, but part of running this thing
//! in production.

use serde::Serialize;

use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct RegistryMetrics {
    pub distinct_filters: usize,
    pub subscriber_records: usize,
    pub topic_records: usize,
}

/// Snapshots table sizes via dirty reads, same as the hot paths do — a
/// metrics poll should never compete with a transaction for the write
/// lock.
pub fn snapshot(store: &dyn Store) -> RegistryMetrics {
    let filters = store.dirty_all_filters();
    let subscriber_records: usize = filters.iter().map(|f| store.dirty_subscriber_records(f).len()).sum();
    let topic_records: usize = filters.iter().map(|f| store.dirty_topic_records(f).len()).sum();

    RegistryMetrics {
        distinct_filters: filters.len(),
        subscriber_records,
        topic_records,
    }
}
