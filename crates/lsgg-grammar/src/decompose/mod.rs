//! Graph decomposers: where to anchor extractions and how to apply a
//! substitution in a given graph representation.
//!
//! The grammar only talks to a [`Decomposer`]. Plain labeled graphs use
//! [`GenericDecomposer`] or [`EgoDecomposer`]; [`minor`] handles two-level
//! base/abstract graphs and [`rna`] folded RNA graphs.

pub mod minor;
pub mod rna;

use lsgg_core::{LabeledGraph, NodeId};
use tracing::trace;

use crate::cip::{extract_cip, extract_cips, CoreInterfacePair, Root};
use crate::error::GrammarError;
use crate::substitute::substitute_core;

/// Capability set the grammar needs from a graph representation.
pub trait Decomposer: Send + Sync {
    /// The graph representation this decomposer works on.
    type Graph: Clone + Send + Sync;

    /// Candidate anchors, in a deterministic order.
    fn roots(&self, graph: &Self::Graph) -> Vec<Root>;

    /// The CIP of `root` at one (radius, thickness) pair, `None` when the
    /// extraction is degenerate.
    fn extract(
        &self,
        graph: &Self::Graph,
        root: &Root,
        radius: u32,
        thickness: u32,
    ) -> Result<Option<CoreInterfacePair>, GrammarError>;

    /// One CIP per radius. Override when a shared BFS is cheaper.
    fn extract_all(
        &self,
        graph: &Self::Graph,
        root: &Root,
        radii: &[u32],
        thickness: u32,
    ) -> Result<Vec<CoreInterfacePair>, GrammarError> {
        let mut cips = Vec::new();
        for &radius in radii {
            if let Some(cip) = self.extract(graph, root, radius, thickness)? {
                cips.push(cip);
            }
        }
        Ok(cips)
    }

    /// Replaces `probe`'s core with `donor`'s. `None` when the result is not
    /// valid for this representation.
    fn substitute(
        &self,
        graph: &Self::Graph,
        probe: &CoreInterfacePair,
        donor: &CoreInterfacePair,
    ) -> Option<Self::Graph>;
}

// ---------------------------------------------------------------------------
// GenericDecomposer
// ---------------------------------------------------------------------------

/// Every non-edge node is a root.
#[derive(Debug, Clone, Default)]
pub struct GenericDecomposer {
    /// Reject substitutions that split the graph into more components.
    pub require_connected: bool,
}

impl GenericDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected() -> Self {
        GenericDecomposer {
            require_connected: true,
        }
    }
}

impl Decomposer for GenericDecomposer {
    type Graph = LabeledGraph;

    fn roots(&self, graph: &LabeledGraph) -> Vec<Root> {
        graph
            .node_ids()
            .into_iter()
            .filter(|&id| graph.node(id).is_some_and(|node| !node.is_edge))
            .map(Root::Node)
            .collect()
    }

    fn extract(
        &self,
        graph: &LabeledGraph,
        root: &Root,
        radius: u32,
        thickness: u32,
    ) -> Result<Option<CoreInterfacePair>, GrammarError> {
        extract_cip(graph, root, radius, thickness)
    }

    fn extract_all(
        &self,
        graph: &LabeledGraph,
        root: &Root,
        radii: &[u32],
        thickness: u32,
    ) -> Result<Vec<CoreInterfacePair>, GrammarError> {
        extract_cips(graph, root, radii, &[thickness])
    }

    fn substitute(
        &self,
        graph: &LabeledGraph,
        probe: &CoreInterfacePair,
        donor: &CoreInterfacePair,
    ) -> Option<LabeledGraph> {
        let result = substitute_core(graph, probe, donor)?;
        if self.require_connected && result.component_count() > graph.component_count() {
            trace!(root = %probe.root, "substitution rejected: graph became disconnected");
            return None;
        }
        Some(result)
    }
}

// ---------------------------------------------------------------------------
// EgoDecomposer
// ---------------------------------------------------------------------------

/// Roots are node sets produced by a caller-supplied function, for example
/// cycles or functional groups.
#[derive(Debug, Clone)]
pub struct EgoDecomposer<F> {
    select: F,
    inner: GenericDecomposer,
}

impl<F> EgoDecomposer<F>
where
    F: Fn(&LabeledGraph) -> Vec<Vec<NodeId>> + Send + Sync,
{
    pub fn new(select: F) -> Self {
        EgoDecomposer {
            select,
            inner: GenericDecomposer::new(),
        }
    }

    pub fn require_connected(mut self, require: bool) -> Self {
        self.inner.require_connected = require;
        self
    }
}

impl<F> Decomposer for EgoDecomposer<F>
where
    F: Fn(&LabeledGraph) -> Vec<Vec<NodeId>> + Send + Sync,
{
    type Graph = LabeledGraph;

    fn roots(&self, graph: &LabeledGraph) -> Vec<Root> {
        (self.select)(graph)
            .into_iter()
            .filter(|nodes| !nodes.is_empty())
            .map(|mut nodes| {
                nodes.sort_unstable();
                nodes.dedup();
                Root::Set(nodes)
            })
            .collect()
    }

    fn extract(
        &self,
        graph: &LabeledGraph,
        root: &Root,
        radius: u32,
        thickness: u32,
    ) -> Result<Option<CoreInterfacePair>, GrammarError> {
        self.inner.extract(graph, root, radius, thickness)
    }

    fn extract_all(
        &self,
        graph: &LabeledGraph,
        root: &Root,
        radii: &[u32],
        thickness: u32,
    ) -> Result<Vec<CoreInterfacePair>, GrammarError> {
        self.inner.extract_all(graph, root, radii, thickness)
    }

    fn substitute(
        &self,
        graph: &LabeledGraph,
        probe: &CoreInterfacePair,
        donor: &CoreInterfacePair,
    ) -> Option<LabeledGraph> {
        self.inner.substitute(graph, probe, donor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsgg_core::GraphNode;

    fn path(labels: &[&str]) -> (LabeledGraph, Vec<NodeId>) {
        let mut g = LabeledGraph::undirected();
        let ids: Vec<NodeId> = labels.iter().map(|l| g.add_labeled(*l)).collect();
        for pair in ids.windows(2) {
            g.add_edge(pair[0], pair[1]).unwrap();
        }
        (g, ids)
    }

    #[test]
    fn generic_roots_skip_edge_nodes() {
        let mut g = LabeledGraph::undirected();
        let a = g.add_labeled("A");
        let e = g.add_node(GraphNode::edge("-"));
        let b = g.add_labeled("B");
        g.add_edge(a, e).unwrap();
        g.add_edge(e, b).unwrap();

        let roots = GenericDecomposer::new().roots(&g);
        assert_eq!(roots, vec![Root::Node(a), Root::Node(b)]);
    }

    #[test]
    fn generic_extract_all_matches_single_extractions() {
        let (g, ids) = path(&["A", "B", "C", "D", "E"]);
        let d = GenericDecomposer::new();
        let root = Root::Node(ids[2]);
        let all = d.extract_all(&g, &root, &[0, 1], 1).unwrap();
        assert_eq!(all.len(), 2);
        for cip in &all {
            let single = d.extract(&g, &root, cip.radius, 1).unwrap().unwrap();
            assert_eq!(single.core_hash, cip.core_hash);
            assert_eq!(single.interface_hash, cip.interface_hash);
        }
    }

    #[test]
    fn connectivity_requirement_rejects_splits() {
        // The donor core has two shards, one per interface node.
        let (g, ids) = path(&["A", "B", "C"]);
        let mut donor_graph = LabeledGraph::undirected();
        let a = donor_graph.add_labeled("A");
        let x = donor_graph.add_labeled("X");
        let y = donor_graph.add_labeled("Y");
        let c = donor_graph.add_labeled("C");
        donor_graph.add_edge(a, x).unwrap();
        donor_graph.add_edge(y, c).unwrap();

        let probe = extract_cip(&g, &Root::Node(ids[1]), 0, 1).unwrap().unwrap();
        let donor = extract_cip(&donor_graph, &Root::Set(vec![x, y]), 0, 1)
            .unwrap()
            .unwrap();
        assert_eq!(probe.interface_hash, donor.interface_hash);

        assert!(GenericDecomposer::new().substitute(&g, &probe, &donor).is_some());
        assert!(GenericDecomposer::connected()
            .substitute(&g, &probe, &donor)
            .is_none());
    }

    #[test]
    fn ego_roots_are_sorted_sets() {
        let (g, ids) = path(&["A", "B", "C", "D"]);
        let (b, c) = (ids[1], ids[2]);
        let d = EgoDecomposer::new(move |_: &LabeledGraph| vec![vec![c, b], vec![]]);
        assert_eq!(d.roots(&g), vec![Root::Set(vec![ids[1], ids[2]])]);
        let cip = d
            .extract(&g, &Root::Set(vec![ids[1], ids[2]]), 0, 1)
            .unwrap()
            .unwrap();
        assert_eq!(cip.core_nodes.len(), 2);
        assert_eq!(cip.interface_nodes.len(), 2);
    }
}
