use std::time::Duration;

use thiserror::Error;

use super::connection::ConnectionError;
use crate::graph::GraphError;

/// Errors reported by [`HmrEngine`](super::HmrEngine).
#[derive(Debug, Error)]
pub enum HmrError {
    #[error("unknown module `{0}`")]
    UnknownModule(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid boundary pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // No #[source]: the chain is already printed by `{:#}`
    #[error("update callback failed: {0:#}")]
    Callback(anyhow::Error),

    #[error("update of `{file}` timed out after {timeout:?}")]
    Timeout { file: String, timeout: Duration },

    #[error("engine is closed")]
    Closed,

    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
}
