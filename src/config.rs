use std::time::Duration;

/// Static configuration for a [`crate::router::Router`], cloned into place
/// at construction time.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Interval between incumbent-absence polls during takeover, a
    /// concession to absent coordination primitives.
    pub register_poll_interval: Duration,
    /// Maximum live publish worker threads allowed in flight at once before
    /// `publish` returns `RouterError::SystemLimit`.
    pub max_inflight_publishes: usize,
}

impl Default for RouterConfig {
    fn default() -> RouterConfig {
        RouterConfig {
            register_poll_interval: Duration::from_millis(100),
            max_inflight_publishes: 10_000,
        }
    }
}
