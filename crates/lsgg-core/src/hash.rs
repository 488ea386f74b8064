//! Canonical, order-independent hashing of labeled subgraphs using blake3.
//!
//! Two node sets that induce isomorphic labeled subgraphs hash equally no
//! matter how their nodes are numbered. The hash is built in three levels:
//!
//! - **Level 1**: node key, supplied by the caller. Usually the label hash
//!   combined with an annotation (a distance, a shard index).
//! - **Level 2**: node name, the sorted multiset of `(key, distance)` pairs
//!   over every node reachable inside the subgraph within [`NAME_HORIZON`]
//!   steps.
//! - **Level 3**: subgraph hash, composed from the sorted edge entries
//!   (pairs of endpoint names) and the sorted node names.
//!
//! # Determinism
//!
//! - Every list is sorted before it is fed to the hasher.
//! - Node ids never reach the hasher; only labels, annotations and
//!   distances do.
//! - Undirected edges hash their endpoint names as an ordered (min, max)
//!   pair, directed edges as (source, target).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::LabeledGraph;
use crate::id::NodeId;
use crate::node::GraphNode;

/// BFS depth used when naming a node.
pub const NAME_HORIZON: u32 = 20;

/// A 32-byte structural digest. Totally ordered so hashes can be sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphHash(pub [u8; 32]);

impl GraphHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The first eight bytes as a little-endian integer. Handy as a compact
    /// feature index; not collision resistant.
    pub fn short(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(bytes)
    }
}

impl From<blake3::Hash> for GraphHash {
    fn from(hash: blake3::Hash) -> Self {
        GraphHash(*hash.as_bytes())
    }
}

impl fmt::Display for GraphHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Level 1: node keys
// ---------------------------------------------------------------------------

/// Hash of a node's label and edge flag.
pub fn hash_label(node: &GraphNode) -> GraphHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(node.label.as_bytes());
    hasher.update(&[node.is_edge as u8]);
    hasher.finalize().into()
}

/// Combines a base hash with a tagged integer annotation.
pub fn annotate(base: GraphHash, tag: u8, value: u64) -> GraphHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(base.as_bytes());
    hasher.update(&[tag]);
    hasher.update(&value.to_le_bytes());
    hasher.finalize().into()
}

/// Folds several hashes, in the given order, with a salt.
pub fn fold(parts: &[GraphHash], salt: u64) -> GraphHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&salt.to_le_bytes());
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hasher.finalize().into()
}

/// Folds protected-node markers into `base`. Marker order is irrelevant;
/// with no markers `base` is returned unchanged.
pub fn fold_markers(base: GraphHash, markers: &[u64]) -> GraphHash {
    if markers.is_empty() {
        return base;
    }
    let mut sorted = markers.to_vec();
    sorted.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    hasher.update(base.as_bytes());
    hasher.update(&(sorted.len() as u64).to_le_bytes());
    for marker in sorted {
        hasher.update(&marker.to_le_bytes());
    }
    hasher.finalize().into()
}

// ---------------------------------------------------------------------------
// Level 2: node names
// ---------------------------------------------------------------------------

/// Undirected adjacency restricted to `nodes`.
fn restricted_adjacency(
    graph: &LabeledGraph,
    nodes: &BTreeSet<NodeId>,
) -> BTreeMap<NodeId, Vec<NodeId>> {
    nodes
        .iter()
        .filter(|&&n| graph.contains(n))
        .map(|&n| {
            let inside = graph
                .neighbors(n)
                .into_iter()
                .filter(|m| nodes.contains(m))
                .collect();
            (n, inside)
        })
        .collect()
}

fn name_with_adjacency<F>(
    graph: &LabeledGraph,
    adjacency: &BTreeMap<NodeId, Vec<NodeId>>,
    start: NodeId,
    horizon: u32,
    key: &F,
) -> GraphHash
where
    F: Fn(NodeId, &GraphNode) -> GraphHash,
{
    let mut dist: BTreeMap<NodeId, u32> = BTreeMap::from([(start, 0)]);
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let d = dist[&current];
        if d >= horizon {
            continue;
        }
        for &next in adjacency.get(&current).map(Vec::as_slice).unwrap_or(&[]) {
            if !dist.contains_key(&next) {
                dist.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }

    let mut entries: Vec<(GraphHash, u32)> = dist
        .into_iter()
        .filter_map(|(id, d)| graph.node(id).map(|node| (key(id, node), d)))
        .collect();
    entries.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for (k, d) in entries {
        hasher.update(k.as_bytes());
        hasher.update(&d.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Canonical name of `node` inside the subgraph induced by `nodes`, looking
/// `horizon` steps around it.
pub fn node_name<F>(
    graph: &LabeledGraph,
    nodes: &BTreeSet<NodeId>,
    node: NodeId,
    horizon: u32,
    key: F,
) -> GraphHash
where
    F: Fn(NodeId, &GraphNode) -> GraphHash,
{
    let adjacency = restricted_adjacency(graph, nodes);
    name_with_adjacency(graph, &adjacency, node, horizon, &key)
}

// ---------------------------------------------------------------------------
// Level 3: subgraph hashes
// ---------------------------------------------------------------------------

/// Canonical hash of the subgraph induced by `nodes`, with node keys from
/// `key`. Ids in `nodes` that are not in the graph are ignored.
pub fn subgraph_hash<F>(graph: &LabeledGraph, nodes: &BTreeSet<NodeId>, key: F) -> GraphHash
where
    F: Fn(NodeId, &GraphNode) -> GraphHash,
{
    let adjacency = restricted_adjacency(graph, nodes);
    let names: BTreeMap<NodeId, GraphHash> = adjacency
        .keys()
        .map(|&n| (n, name_with_adjacency(graph, &adjacency, n, NAME_HORIZON, &key)))
        .collect();

    let directed = graph.mode().is_directed();
    let mut edge_entries: Vec<(GraphHash, GraphHash, GraphHash)> = graph
        .edges()
        .into_iter()
        .filter_map(|(a, b, weight)| {
            let na = *names.get(&a)?;
            let nb = *names.get(&b)?;
            let label: GraphHash = blake3::hash(weight.label.as_bytes()).into();
            if directed || na <= nb {
                Some((na, nb, label))
            } else {
                Some((nb, na, label))
            }
        })
        .collect();
    edge_entries.sort_unstable();

    let mut node_entries: Vec<GraphHash> = names.into_values().collect();
    node_entries.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    hasher.update(&[directed as u8]);
    hasher.update(&(node_entries.len() as u64).to_le_bytes());
    for name in &node_entries {
        hasher.update(name.as_bytes());
    }
    hasher.update(&(edge_entries.len() as u64).to_le_bytes());
    for (a, b, label) in &edge_entries {
        hasher.update(a.as_bytes());
        hasher.update(b.as_bytes());
        hasher.update(label.as_bytes());
    }
    hasher.finalize().into()
}

/// Canonical hash of a whole graph keyed by labels only.
pub fn graph_hash(graph: &LabeledGraph) -> GraphHash {
    let all: BTreeSet<NodeId> = graph.node_ids().into_iter().collect();
    subgraph_hash(graph, &all, |_, node| hash_label(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::GraphEdge;

    fn path(labels: &[&str]) -> LabeledGraph {
        let mut g = LabeledGraph::undirected();
        let ids: Vec<NodeId> = labels.iter().map(|l| g.add_labeled(*l)).collect();
        for pair in ids.windows(2) {
            g.add_edge(pair[0], pair[1]).unwrap();
        }
        g
    }

    #[test]
    fn graph_hash_deterministic() {
        let g = path(&["A", "B", "C"]);
        assert_eq!(graph_hash(&g), graph_hash(&g));
    }

    #[test]
    fn graph_hash_ignores_numbering() {
        let forward = path(&["A", "B", "C"]);
        let backward = path(&["C", "B", "A"]);
        assert_eq!(graph_hash(&forward), graph_hash(&backward));
    }

    #[test]
    fn graph_hash_sees_labels_and_structure() {
        let abc = path(&["A", "B", "C"]);
        let abd = path(&["A", "B", "D"]);
        let bac = path(&["B", "A", "C"]);
        assert_ne!(graph_hash(&abc), graph_hash(&abd));
        assert_ne!(graph_hash(&abc), graph_hash(&bac));
    }

    #[test]
    fn edge_labels_change_the_hash() {
        let mut g1 = LabeledGraph::undirected();
        let a = g1.add_labeled("A");
        let b = g1.add_labeled("B");
        g1.add_labeled_edge(a, b, GraphEdge::new("single")).unwrap();

        let mut g2 = LabeledGraph::undirected();
        let a = g2.add_labeled("A");
        let b = g2.add_labeled("B");
        g2.add_labeled_edge(a, b, GraphEdge::new("double")).unwrap();

        assert_ne!(graph_hash(&g1), graph_hash(&g2));
    }

    #[test]
    fn direction_matters_only_for_directed_graphs() {
        let mut d1 = LabeledGraph::directed();
        let a = d1.add_labeled("A");
        let b = d1.add_labeled("B");
        d1.add_edge(a, b).unwrap();

        let mut d2 = LabeledGraph::directed();
        let a = d2.add_labeled("A");
        let b = d2.add_labeled("B");
        d2.add_edge(b, a).unwrap();

        assert_ne!(graph_hash(&d1), graph_hash(&d2));
    }

    #[test]
    fn subgraph_hash_uses_custom_keys() {
        let g = path(&["A", "B", "C"]);
        let ids: BTreeSet<NodeId> = g.node_ids().into_iter().collect();
        let plain = subgraph_hash(&g, &ids, |_, n| hash_label(n));
        let shifted = subgraph_hash(&g, &ids, |_, n| annotate(hash_label(n), 1, 3));
        assert_ne!(plain, shifted);
    }

    #[test]
    fn fold_markers_is_order_free_and_identity_on_empty() {
        let base: GraphHash = blake3::hash(b"interface").into();
        assert_eq!(fold_markers(base, &[]), base);
        assert_eq!(fold_markers(base, &[1, 2]), fold_markers(base, &[2, 1]));
        assert_ne!(fold_markers(base, &[1]), base);
    }

    #[test]
    fn node_names_distinguish_positions() {
        let g = path(&["A", "A", "A"]);
        let ids: BTreeSet<NodeId> = g.node_ids().into_iter().collect();
        let key = |_: NodeId, n: &GraphNode| hash_label(n);
        let end = node_name(&g, &ids, NodeId(0), NAME_HORIZON, key);
        let middle = node_name(&g, &ids, NodeId(1), NAME_HORIZON, key);
        let other_end = node_name(&g, &ids, NodeId(2), NAME_HORIZON, key);
        assert_eq!(end, other_end);
        assert_ne!(end, middle);
    }
}
