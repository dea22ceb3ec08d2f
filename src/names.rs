//! Node-local client registry: `client_id -> process handle`, with no
//! network involvement.

use dashmap::DashMap;

/// A node-local directory mapping connected client ids to a handle `H`
/// (typically an [`crate::fsm::Fsm`] implementor) used to reach them.
/// Distinct from the cluster-wide subscription/registry tables: this lives
/// only on the node a client is actually connected to.
pub trait LocalNames<H>: Send + Sync {
    /// Binds `client_id` to `handle`, replacing any previous binding.
    fn bind(&self, client_id: &str, handle: H);

    /// Removes the binding for `client_id`, if any.
    fn unbind(&self, client_id: &str);

    /// True if `client_id` currently has a local binding.
    fn contains(&self, client_id: &str) -> bool;

    /// The handle bound to `client_id`, if connected locally.
    fn lookup(&self, client_id: &str) -> Option<H>;
}

/// `DashMap`-backed reference implementation: lock-free reads and writes
/// under concurrent access from the register/publish worker threads.
pub struct DashMapNames<H> {
    handles: DashMap<String, H>,
}

impl<H> DashMapNames<H> {
    pub fn new() -> DashMapNames<H> {
        DashMapNames { handles: DashMap::new() }
    }
}

impl<H> Default for DashMapNames<H> {
    fn default() -> DashMapNames<H> {
        DashMapNames::new()
    }
}

impl<H: Clone + Send + Sync> LocalNames<H> for DashMapNames<H> {
    fn bind(&self, client_id: &str, handle: H) {
        self.handles.insert(client_id.to_owned(), handle);
    }

    fn unbind(&self, client_id: &str) {
        self.handles.remove(client_id);
    }

    fn contains(&self, client_id: &str) -> bool {
        self.handles.contains_key(client_id)
    }

    fn lookup(&self, client_id: &str) -> Option<H> {
        self.handles.get(client_id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bind_unbind_round_trip() {
        let names: DashMapNames<u32> = DashMapNames::new();
        assert!(!names.contains("c1"));
        names.bind("c1", 7);
        assert!(names.contains("c1"));
        assert_eq!(names.lookup("c1"), Some(7));
        names.unbind("c1");
        assert!(!names.contains("c1"));
        assert_eq!(names.lookup("c1"), None);
    }

    #[test]
    fn rebind_replaces_handle() {
        let names: DashMapNames<u32> = DashMapNames::new();
        names.bind("c1", 1);
        names.bind("c1", 2);
        assert_eq!(names.lookup("c1"), Some(2));
    }
}
