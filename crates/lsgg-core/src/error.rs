//! Core error types for lsgg-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! misuse of the labeled graph model.

use crate::id::NodeId;
use thiserror::Error;

/// Core errors produced by the lsgg-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id was not found in the graph.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },
}
