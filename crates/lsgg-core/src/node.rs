//! Node and edge weights of a [`LabeledGraph`](crate::graph::LabeledGraph).
//!
//! A node carries a label and an `is_edge` flag. Edge nodes are produced by
//! the edge-to-vertex expansion: every edge of the original graph becomes a
//! node of its own, so hyperedges and labeled edges can take part in cores
//! and interfaces like any other node.
//!
//! A node of a coarse (minor) graph additionally records the set of nodes of
//! the finer graph it `represents`. The two graphs stay separate values; the
//! relation is only a set of ids into the finer graph.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A labeled node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// The node label. Only labels (and structure) take part in hashing.
    pub label: String,
    /// `true` if this node stands for an edge of the unexpanded graph.
    pub is_edge: bool,
    /// Nodes of a finer-grained graph contracted into this node. Empty for
    /// base-level graphs.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub represents: BTreeSet<NodeId>,
}

impl GraphNode {
    /// Creates a plain (non-edge) node.
    pub fn new(label: impl Into<String>) -> Self {
        GraphNode {
            label: label.into(),
            is_edge: false,
            represents: BTreeSet::new(),
        }
    }

    /// Creates an edge node, as produced by the edge-to-vertex expansion.
    pub fn edge(label: impl Into<String>) -> Self {
        GraphNode {
            label: label.into(),
            is_edge: true,
            represents: BTreeSet::new(),
        }
    }

    /// Creates a minor-graph node contracting `represents` finer nodes.
    pub fn contracted(label: impl Into<String>, represents: BTreeSet<NodeId>) -> Self {
        GraphNode {
            label: label.into(),
            is_edge: false,
            represents,
        }
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// An edge weight. The label may be empty; it is matched when interfaces
/// are aligned during substitution and becomes the node label under
/// edge-to-vertex expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub label: String,
}

impl GraphEdge {
    pub fn new(label: impl Into<String>) -> Self {
        GraphEdge {
            label: label.into(),
        }
    }
}

/// Whether edge direction is meaningful for a graph.
///
/// Undirected graphs still store each edge once with an arbitrary
/// orientation; every query treats it symmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeMode {
    Undirected,
    Directed,
}

impl EdgeMode {
    pub fn is_directed(self) -> bool {
        matches!(self, EdgeMode::Directed)
    }
}
