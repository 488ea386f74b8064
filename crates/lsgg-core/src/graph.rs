//! LabeledGraph: the graph value every grammar operation reads and returns.
//!
//! [`LabeledGraph`] wraps a petgraph `StableGraph` so that node ids survive
//! removals: when a core is cut out of a graph and a replacement is spliced
//! in, every node outside the core keeps its id. Substitution locality is
//! stated in terms of these ids.
//!
//! Edges are always stored in a directed petgraph graph. For
//! [`EdgeMode::Undirected`] graphs the stored orientation is arbitrary and
//! all queries are symmetric. Neighbourhood queries (`neighbors`,
//! `distances`, `components`) always use the undirected view.
//!
//! The graph also owns the protected-node marker map: node id to an opaque
//! marker value. Markers follow their node through `induced_subgraph` and
//! `expand_edges` and disappear with `remove_node`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::unionfind::UnionFind;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{EdgeId, NodeId};
use crate::node::{EdgeMode, GraphEdge, GraphNode};

/// A labeled graph with stable node ids and protected-node markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledGraph {
    inner: StableGraph<GraphNode, GraphEdge, Directed, u32>,
    mode: EdgeMode,
    /// Protected-node markers, keyed by node.
    markers: BTreeMap<NodeId, u64>,
}

impl LabeledGraph {
    /// Creates an empty graph.
    pub fn new(mode: EdgeMode) -> Self {
        LabeledGraph {
            inner: StableGraph::new(),
            mode,
            markers: BTreeMap::new(),
        }
    }

    /// Creates an empty undirected graph.
    pub fn undirected() -> Self {
        Self::new(EdgeMode::Undirected)
    }

    /// Creates an empty directed graph.
    pub fn directed() -> Self {
        Self::new(EdgeMode::Directed)
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn mode(&self) -> EdgeMode {
        self.mode
    }

    /// Returns a read-only reference to the underlying petgraph graph.
    pub fn inner(&self) -> &StableGraph<GraphNode, GraphEdge, Directed, u32> {
        &self.inner
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.inner.node_weight(id.into())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.inner.node_weight_mut(id.into())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.contains_node(id.into())
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.node_indices().map(NodeId::from).collect()
    }

    /// All edges as `(source, target, weight)`, in edge-index order.
    pub fn edges(&self) -> Vec<(NodeId, NodeId, &GraphEdge)> {
        self.inner
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.inner.edge_endpoints(e)?;
                let weight = self.inner.edge_weight(e)?;
                Some((NodeId::from(a), NodeId::from(b), weight))
            })
            .collect()
    }

    /// Neighbours of `id` in the undirected view, ascending and deduplicated.
    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        let idx: NodeIndex<u32> = id.into();
        if !self.inner.contains_node(idx) {
            return Vec::new();
        }
        let set: BTreeSet<NodeId> = self
            .inner
            .neighbors_undirected(idx)
            .map(NodeId::from)
            .collect();
        set.into_iter().collect()
    }

    /// Targets of edges leaving `id`. Same as `neighbors` for undirected
    /// graphs.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.directed_neighbors(id, Direction::Outgoing)
    }

    /// Sources of edges entering `id`. Same as `neighbors` for undirected
    /// graphs.
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.directed_neighbors(id, Direction::Incoming)
    }

    fn directed_neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        if !self.mode.is_directed() {
            return self.neighbors(id);
        }
        let idx: NodeIndex<u32> = id.into();
        if !self.inner.contains_node(idx) {
            return Vec::new();
        }
        let set: BTreeSet<NodeId> = self
            .inner
            .neighbors_directed(idx, direction)
            .map(NodeId::from)
            .collect();
        set.into_iter().collect()
    }

    /// Returns `true` if an edge `a -> b` exists. For undirected graphs the
    /// orientation is ignored.
    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        match self.mode {
            EdgeMode::Directed => self.inner.find_edge(a.into(), b.into()).is_some(),
            EdgeMode::Undirected => self
                .inner
                .find_edge_undirected(a.into(), b.into())
                .is_some(),
        }
    }

    pub fn marker(&self, id: NodeId) -> Option<u64> {
        self.markers.get(&id).copied()
    }

    pub fn markers(&self) -> &BTreeMap<NodeId, u64> {
        &self.markers
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, node: GraphNode) -> NodeId {
        NodeId::from(self.inner.add_node(node))
    }

    /// Convenience: adds a plain node with the given label.
    pub fn add_labeled(&mut self, label: impl Into<String>) -> NodeId {
        self.add_node(GraphNode::new(label))
    }

    /// Adds an unlabeled edge. Both nodes must exist.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, CoreError> {
        self.add_labeled_edge(from, to, GraphEdge::default())
    }

    /// Adds an edge with the given weight. Both nodes must exist.
    pub fn add_labeled_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        edge: GraphEdge,
    ) -> Result<EdgeId, CoreError> {
        if !self.contains(from) {
            return Err(CoreError::NodeNotFound { id: from });
        }
        if !self.contains(to) {
            return Err(CoreError::NodeNotFound { id: to });
        }
        if from == to {
            return Err(CoreError::InvalidEdge {
                reason: format!("self loop on node {}", from),
            });
        }
        let idx = self.inner.add_edge(from.into(), to.into(), edge);
        Ok(EdgeId::from(idx))
    }

    /// Removes a node, its incident edges and its marker.
    pub fn remove_node(&mut self, id: NodeId) -> Result<GraphNode, CoreError> {
        self.markers.remove(&id);
        self.inner
            .remove_node(id.into())
            .ok_or(CoreError::NodeNotFound { id })
    }

    /// Attaches a protected-node marker to an existing node.
    pub fn set_marker(&mut self, id: NodeId, marker: u64) -> Result<(), CoreError> {
        if !self.contains(id) {
            return Err(CoreError::NodeNotFound { id });
        }
        self.markers.insert(id, marker);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Structural queries
    // -----------------------------------------------------------------------

    /// Multi-source breadth-first distances in the undirected view, bounded
    /// by `horizon`. Nodes further away than `horizon` are absent.
    pub fn distances(
        &self,
        sources: &[NodeId],
        horizon: u32,
    ) -> Result<BTreeMap<NodeId, u32>, CoreError> {
        let mut dist = BTreeMap::new();
        let mut queue = VecDeque::new();
        for &source in sources {
            if !self.contains(source) {
                return Err(CoreError::NodeNotFound { id: source });
            }
            if dist.insert(source, 0).is_none() {
                queue.push_back(source);
            }
        }

        while let Some(current) = queue.pop_front() {
            let d = dist[&current];
            if d >= horizon {
                continue;
            }
            for next in self.inner.neighbors_undirected(current.into()) {
                let next = NodeId::from(next);
                if !dist.contains_key(&next) {
                    dist.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        Ok(dist)
    }

    /// The subgraph induced by `keep`. Node ids, edges between kept nodes and
    /// markers of kept nodes are preserved; unknown ids are ignored.
    pub fn induced_subgraph(&self, keep: &BTreeSet<NodeId>) -> LabeledGraph {
        let mut inner = self.inner.clone();
        inner.retain_nodes(|_, idx| keep.contains(&NodeId::from(idx)));
        let markers = self
            .markers
            .iter()
            .filter(|(id, _)| keep.contains(*id))
            .map(|(&id, &m)| (id, m))
            .collect();
        LabeledGraph {
            inner,
            mode: self.mode,
            markers,
        }
    }

    /// Connected components of the subgraph induced by `nodes` (undirected
    /// view), each as a sorted set, ordered by their smallest id.
    pub fn components(&self, nodes: &BTreeSet<NodeId>) -> Vec<BTreeSet<NodeId>> {
        let Some(max) = nodes.iter().next_back() else {
            return Vec::new();
        };
        let mut uf = UnionFind::<usize>::new(max.0 as usize + 1);
        for (a, b, _) in self.edges() {
            if nodes.contains(&a) && nodes.contains(&b) {
                uf.union(a.0 as usize, b.0 as usize);
            }
        }

        let mut groups: BTreeMap<usize, BTreeSet<NodeId>> = BTreeMap::new();
        for &id in nodes {
            if self.contains(id) {
                groups.entry(uf.find(id.0 as usize)).or_default().insert(id);
            }
        }
        let mut components: Vec<BTreeSet<NodeId>> = groups.into_values().collect();
        components.sort_by_key(|c| c.iter().next().copied());
        components
    }

    /// Number of (weakly) connected components.
    pub fn component_count(&self) -> usize {
        let all: BTreeSet<NodeId> = self.node_ids().into_iter().collect();
        self.components(&all).len()
    }

    /// Returns `true` if the graph is (weakly) connected. The empty graph
    /// counts as connected.
    pub fn is_connected(&self) -> bool {
        self.component_count() <= 1
    }

    /// Edge-to-vertex expansion.
    ///
    /// Every edge `a -> b` with label `l` becomes an edge node labeled `l`
    /// wired as `a -> e -> b`. Existing node ids and markers are kept.
    /// Expanding an already expanded graph expands it again.
    pub fn expand_edges(&self) -> LabeledGraph {
        let edges: Vec<(NodeId, NodeId, GraphEdge)> = self
            .edges()
            .into_iter()
            .map(|(a, b, w)| (a, b, w.clone()))
            .collect();

        let mut expanded = self.clone();
        expanded.inner.clear_edges();
        for (a, b, weight) in edges {
            let e = NodeId::from(expanded.inner.add_node(GraphNode::edge(weight.label)));
            expanded
                .inner
                .add_edge(a.into(), e.into(), GraphEdge::default());
            expanded
                .inner
                .add_edge(e.into(), b.into(), GraphEdge::default());
        }
        expanded
    }
}
