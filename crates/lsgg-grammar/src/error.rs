//! Grammar error types.
//!
//! [`GrammarError`] covers structural impossibility only: misuse or
//! malformed input the caller has to fix. A missing congruent donor or a
//! rejected substitution is not an error; those surface as an empty
//! candidate set or `None`.

use lsgg_core::{CoreError, NodeId};
use thiserror::Error;

/// Errors produced by the lsgg-grammar crate.
#[derive(Debug, Error)]
pub enum GrammarError {
    /// The grammar configuration is contradictory or empty.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The configuration document could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A root names a node that is not in the graph.
    #[error("root node not found: NodeId({id})", id = id.0)]
    RootNotFound { id: NodeId },

    /// A root set without any node.
    #[error("empty root")]
    EmptyRoot,

    /// A dot-bracket structure or sequence could not be turned into a graph.
    #[error("invalid structure: {reason}")]
    InvalidStructure { reason: String },

    /// The worker pool for a parallel fit could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A graph operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}
