//! Core-interface-pair (CIP) extraction.
//!
//! Given a graph, a root and a (radius, thickness) pair, a bounded BFS from
//! the root splits the neighbourhood into:
//!
//! - the **core**: nodes at distance `<= radius`,
//! - the **interface**: nodes at distance in `(radius, radius + thickness]`.
//!
//! The core hash keys each node by its label and shard index. The interface
//! hash keys each node by its label and its distance from the core (the
//! distance-dependent label), then folds in the protected markers found in
//! the core. Equal interface hashes with different core hashes make two
//! CIPs congruent.
//!
//! A disconnected core is split into shards. Shards are numbered by sorting
//! the components on (component hash, sorted node ids), so the numbering is
//! decided by structure; ids only order structurally identical components,
//! which cannot change the resulting hash.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lsgg_core::hash::{annotate, fold_markers, hash_label, subgraph_hash};
use lsgg_core::{GraphHash, LabeledGraph, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::GrammarError;
use crate::similarity::Periphery;

/// Annotation tag for shard indices in core keys.
const SHARD_TAG: u8 = 1;
/// Annotation tag for distance-from-core in interface keys.
const DISTANCE_TAG: u8 = 2;

// ---------------------------------------------------------------------------
// Roots
// ---------------------------------------------------------------------------

/// Anchor of an extraction: one node or a small set of nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Root {
    Node(NodeId),
    Set(Vec<NodeId>),
}

impl Root {
    pub fn nodes(&self) -> &[NodeId] {
        match self {
            Root::Node(id) => std::slice::from_ref(id),
            Root::Set(ids) => ids,
        }
    }
}

impl From<NodeId> for Root {
    fn from(id: NodeId) -> Self {
        Root::Node(id)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Root::Node(id) => write!(f, "{}", id),
            Root::Set(ids) => {
                let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CoreInterfacePair
// ---------------------------------------------------------------------------

/// An extracted, hashed core together with its interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreInterfacePair {
    /// Identity of the core.
    pub core_hash: GraphHash,
    /// Congruence key: interface structure, distances and core markers.
    pub interface_hash: GraphHash,
    pub root: Root,
    pub radius: u32,
    pub thickness: u32,
    pub core_nodes: BTreeSet<NodeId>,
    pub interface_nodes: BTreeSet<NodeId>,
    /// Subgraph induced by core and interface, with the source graph's ids.
    pub graph: LabeledGraph,
    /// Distance from the root for every node of `graph`.
    pub distances: BTreeMap<NodeId, u32>,
    /// Shard index per core node; empty when the core is connected.
    pub shards: BTreeMap<NodeId, u32>,
    /// Protected markers found in the core, sorted.
    pub core_markers: Vec<u64>,
    /// Number of corpus graphs this pair was observed in.
    pub count: u32,
    /// Periphery features, only set by the similarity variant.
    pub periphery: Option<Periphery>,
}

impl CoreInterfacePair {
    pub fn is_core(&self, id: NodeId) -> bool {
        self.core_nodes.contains(&id)
    }

    /// Distance of an interface node from the core, `None` for core nodes
    /// and unknown ids.
    pub fn distance_from_core(&self, id: NodeId) -> Option<u32> {
        if !self.interface_nodes.contains(&id) {
            return None;
        }
        self.distances.get(&id).map(|d| d.saturating_sub(self.radius))
    }

    /// Label hash of an interface node combined with its distance from the
    /// core. Interface alignment during substitution matches on this.
    pub fn distance_dependent_label(&self, id: NodeId) -> Option<GraphHash> {
        let node = self.graph.node(id)?;
        let d = self.distance_from_core(id)?;
        Some(annotate(hash_label(node), DISTANCE_TAG, d as u64))
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Validates `root` against `graph` and returns BFS distances up to `horizon`.
pub(crate) fn root_distances(
    graph: &LabeledGraph,
    root: &Root,
    horizon: u32,
) -> Result<BTreeMap<NodeId, u32>, GrammarError> {
    if root.nodes().is_empty() {
        return Err(GrammarError::EmptyRoot);
    }
    if let Some(&id) = root.nodes().iter().find(|&&id| !graph.contains(id)) {
        return Err(GrammarError::RootNotFound { id });
    }
    Ok(graph.distances(root.nodes(), horizon)?)
}

/// Outermost distance a (radius, thickness) pair looks at.
pub(crate) fn horizon(radius: u32, thickness: u32) -> Result<u32, GrammarError> {
    radius
        .checked_add(thickness)
        .ok_or_else(|| GrammarError::InvalidConfig {
            reason: format!(
                "radius {} with thickness {} exceeds the distance range",
                radius, thickness
            ),
        })
}

/// Extracts the CIP of `root` at one (radius, thickness) pair.
///
/// Returns `Ok(None)` when the core or the interface is empty.
pub fn extract_cip(
    graph: &LabeledGraph,
    root: &Root,
    radius: u32,
    thickness: u32,
) -> Result<Option<CoreInterfacePair>, GrammarError> {
    let dist = root_distances(graph, root, horizon(radius, thickness)?)?;
    Ok(finalize(graph, root, radius, thickness, &dist))
}

/// Extracts one CIP per (radius, thickness) combination from a single BFS.
/// Degenerate combinations are skipped.
pub fn extract_cips(
    graph: &LabeledGraph,
    root: &Root,
    radii: &[u32],
    thicknesses: &[u32],
) -> Result<Vec<CoreInterfacePair>, GrammarError> {
    let max_radius = radii.iter().copied().max().unwrap_or(0);
    let max_thickness = thicknesses.iter().copied().max().unwrap_or(0);
    let dist = root_distances(graph, root, horizon(max_radius, max_thickness)?)?;

    let mut cips = Vec::new();
    for &radius in radii {
        for &thickness in thicknesses {
            if let Some(cip) = finalize(graph, root, radius, thickness, &dist) {
                cips.push(cip);
            }
        }
    }
    Ok(cips)
}

/// Builds the CIP from precomputed root distances.
pub(crate) fn finalize(
    graph: &LabeledGraph,
    root: &Root,
    radius: u32,
    thickness: u32,
    dist: &BTreeMap<NodeId, u32>,
) -> Option<CoreInterfacePair> {
    let core_nodes: BTreeSet<NodeId> = dist
        .iter()
        .filter(|(_, &d)| d <= radius)
        .map(|(&id, _)| id)
        .collect();
    let interface_nodes: BTreeSet<NodeId> = dist
        .iter()
        .filter(|(_, &d)| radius < d && d <= radius.saturating_add(thickness))
        .map(|(&id, _)| id)
        .collect();
    if core_nodes.is_empty() || interface_nodes.is_empty() {
        return None;
    }

    let shards = number_shards(graph, &core_nodes);
    let core_hash = subgraph_hash(graph, &core_nodes, |id, node| {
        let shard = shards.get(&id).copied().unwrap_or(0);
        annotate(hash_label(node), SHARD_TAG, shard as u64)
    });

    let core_markers: Vec<u64> = {
        let mut markers: Vec<u64> = core_nodes.iter().filter_map(|&id| graph.marker(id)).collect();
        markers.sort_unstable();
        markers
    };
    let interface_structure = subgraph_hash(graph, &interface_nodes, |id, node| {
        let d = dist.get(&id).copied().unwrap_or(radius).saturating_sub(radius);
        annotate(hash_label(node), DISTANCE_TAG, d as u64)
    });
    let interface_hash = fold_markers(interface_structure, &core_markers);

    let region: BTreeSet<NodeId> = core_nodes.union(&interface_nodes).copied().collect();
    let distances = dist
        .iter()
        .filter(|(id, _)| region.contains(*id))
        .map(|(&id, &d)| (id, d))
        .collect();

    Some(CoreInterfacePair {
        core_hash,
        interface_hash,
        root: root.clone(),
        radius,
        thickness,
        graph: graph.induced_subgraph(&region),
        core_nodes,
        interface_nodes,
        distances,
        shards,
        core_markers,
        count: 1,
        periphery: None,
    })
}

/// Shard index per node of a disconnected core. Empty for a connected core.
fn number_shards(graph: &LabeledGraph, core: &BTreeSet<NodeId>) -> BTreeMap<NodeId, u32> {
    let components = graph.components(core);
    if components.len() <= 1 {
        return BTreeMap::new();
    }

    let mut keyed: Vec<(GraphHash, BTreeSet<NodeId>)> = components
        .into_iter()
        .map(|c| (subgraph_hash(graph, &c, |_, node| hash_label(node)), c))
        .collect();
    keyed.sort();

    keyed
        .into_iter()
        .enumerate()
        .flat_map(|(shard, (_, nodes))| nodes.into_iter().map(move |id| (id, shard as u32)))
        .collect()
}
