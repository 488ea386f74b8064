//! Labeled graph model and canonical hashing for the local substitution
//! graph grammar.
//!
//! - [`id`]: stable `NodeId` / `EdgeId` newtypes
//! - [`node`]: node and edge weights
//! - [`graph`]: [`LabeledGraph`], a stable-id graph with protected markers
//! - [`hash`]: order-independent subgraph hashing with blake3
//! - [`error`]: [`CoreError`]

pub mod error;
pub mod graph;
pub mod hash;
pub mod id;
pub mod node;

// Re-export commonly used types
pub use error::CoreError;
pub use graph::LabeledGraph;
pub use hash::{graph_hash, subgraph_hash, GraphHash};
pub use id::{EdgeId, NodeId};
pub use node::{EdgeMode, GraphEdge, GraphNode};
