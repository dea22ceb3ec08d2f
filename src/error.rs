use thiserror::Error;

use crate::topic::Filter;

/// Errors surfaced by the routing/subscription core.
///
/// Transactional aborts collected during a `subscribe` batch travel inside
/// `SubscribeErrors` rather than aborting the whole batch (partial success).
#[derive(Error, Debug, Clone)]
pub enum RouterError {
    #[error("cluster not ready")]
    NotReady,

    #[error("subscribe not allowed")]
    NotAllowed,

    #[error("subscribe errors: {0:?}")]
    SubscribeErrors(Vec<(String, String)>),

    #[error("no such client")]
    NotFound,

    #[error("system limit: could not start publish worker")]
    SystemLimit,

    #[error("publish worker went down: {0}")]
    WorkerDown(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid routing key: {0}")]
    InvalidRoutingKey(String),

    #[error("store error: {0}")]
    Store(String),
}

impl RouterError {
    pub fn invariant(detail: impl Into<String>) -> RouterError {
        RouterError::InvariantViolation(detail.into())
    }
}

/// Per-filter outcome of a `subscribe` batch, used to build
/// `RouterError::SubscribeErrors` while letting successful filters stand.
#[derive(Debug)]
pub struct SubscribeOutcome {
    pub failed: Vec<(Filter, RouterError)>,
}

impl SubscribeOutcome {
    pub fn ok() -> SubscribeOutcome {
        SubscribeOutcome { failed: Vec::new() }
    }

    pub fn into_result(self) -> Result<(), RouterError> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(RouterError::SubscribeErrors(
                self.failed
                    .into_iter()
                    .map(|(f, e)| (f.as_str().to_owned(), e.to_string()))
                    .collect(),
            ))
        }
    }
}
