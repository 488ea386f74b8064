//! Core substitution: replace the probe's core with a donor's core.
//!
//! The interfaces of two congruent CIPs are isomorphic as graphs labeled
//! with distance-dependent labels. The correspondence between donor and
//! probe interface nodes is computed with petgraph's VF2 iterator; the
//! first isomorphism found is used. Edges from a donor core node to a donor
//! interface node are re-attached to the matching probe interface node.
//!
//! Everything outside the probe core keeps its id, label and adjacency,
//! since `LabeledGraph` is backed by a `StableGraph`.

use std::collections::BTreeMap;

use lsgg_core::{EdgeMode, GraphHash, LabeledGraph, NodeId};
use petgraph::algo::subgraph_isomorphisms_iter;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::{Directed, EdgeType, Undirected};
use tracing::trace;

use crate::cip::CoreInterfacePair;

/// Replaces `probe`'s core in `graph` with `donor`'s core.
///
/// `graph` is left untouched; `None` means the pair is not substitutable
/// here:
///
/// - the interface hashes differ,
/// - a protected marker in the probe core has no counterpart in the donor
///   core,
/// - the probe does not describe `graph` (missing node, different label),
/// - no interface correspondence exists.
pub fn substitute_core(
    graph: &LabeledGraph,
    probe: &CoreInterfacePair,
    donor: &CoreInterfacePair,
) -> Option<LabeledGraph> {
    if probe.interface_hash != donor.interface_hash {
        return None;
    }
    if graph.mode() != probe.graph.mode() || graph.mode() != donor.graph.mode() {
        return None;
    }
    if !markers_covered(&probe.core_markers, &donor.core_markers) {
        trace!("substitution rejected: protected marker missing in donor core");
        return None;
    }
    let probe_matches = probe.graph.node_ids().into_iter().all(|id| {
        matches!(
            (graph.node(id), probe.graph.node(id)),
            (Some(actual), Some(expected)) if actual.label == expected.label
                && actual.is_edge == expected.is_edge
        )
    });
    if !probe_matches {
        return None;
    }

    let correspondence = match graph.mode() {
        EdgeMode::Undirected => interface_correspondence::<Undirected>(probe, donor),
        EdgeMode::Directed => interface_correspondence::<Directed>(probe, donor),
    };
    let Some(correspondence) = correspondence else {
        trace!("substitution rejected: no interface correspondence");
        return None;
    };

    splice(graph, probe, donor, correspondence)
}

/// True when every marker of `needed` occurs in `available` at least as
/// often. Both slices are sorted.
fn markers_covered(needed: &[u64], available: &[u64]) -> bool {
    let mut pool = available.iter().peekable();
    needed.iter().all(|want| {
        while let Some(&&have) = pool.peek() {
            pool.next();
            if have == *want {
                return true;
            }
            if have > *want {
                return false;
            }
        }
        false
    })
}

/// The interface of `cip` as a petgraph `Graph` keyed by distance-dependent
/// labels, plus the graph index -> node id table.
fn interface_graph<Ty: EdgeType>(
    cip: &CoreInterfacePair,
) -> Option<(Graph<GraphHash, String, Ty>, Vec<NodeId>)> {
    let mut graph = Graph::<GraphHash, String, Ty>::default();
    let mut index: BTreeMap<NodeId, NodeIndex> = BTreeMap::new();
    let mut ids = Vec::with_capacity(cip.interface_nodes.len());
    for &id in &cip.interface_nodes {
        let label = cip.distance_dependent_label(id)?;
        index.insert(id, graph.add_node(label));
        ids.push(id);
    }
    for (a, b, edge) in cip.graph.edges() {
        if let (Some(&ia), Some(&ib)) = (index.get(&a), index.get(&b)) {
            graph.add_edge(ia, ib, edge.label.clone());
        }
    }
    Some((graph, ids))
}

/// Donor interface node -> probe interface node.
fn interface_correspondence<Ty: EdgeType>(
    probe: &CoreInterfacePair,
    donor: &CoreInterfacePair,
) -> Option<BTreeMap<NodeId, NodeId>> {
    let (donor_graph, donor_ids) = interface_graph::<Ty>(donor)?;
    let (probe_graph, probe_ids) = interface_graph::<Ty>(probe)?;
    if donor_graph.node_count() != probe_graph.node_count()
        || donor_graph.edge_count() != probe_graph.edge_count()
    {
        return None;
    }

    let mut node_match = |a: &GraphHash, b: &GraphHash| a == b;
    let mut edge_match = |a: &String, b: &String| a == b;
    let mapping = subgraph_isomorphisms_iter(
        &&donor_graph,
        &&probe_graph,
        &mut node_match,
        &mut edge_match,
    )?
    .next()?;

    Some(
        mapping
            .into_iter()
            .enumerate()
            .map(|(donor_index, probe_index)| (donor_ids[donor_index], probe_ids[probe_index]))
            .collect(),
    )
}

/// Graph surgery on a copy of `graph`.
fn splice(
    graph: &LabeledGraph,
    probe: &CoreInterfacePair,
    donor: &CoreInterfacePair,
    mut placement: BTreeMap<NodeId, NodeId>,
) -> Option<LabeledGraph> {
    let mut result = graph.clone();
    for &id in &probe.core_nodes {
        result.remove_node(id).ok()?;
    }

    for &id in &donor.core_nodes {
        let node = donor.graph.node(id)?.clone();
        let new_id = result.add_node(node);
        if let Some(marker) = donor.graph.marker(id) {
            result.set_marker(new_id, marker).ok()?;
        }
        placement.insert(id, new_id);
    }

    for (a, b, edge) in donor.graph.edges() {
        if !donor.is_core(a) && !donor.is_core(b) {
            continue;
        }
        let from = *placement.get(&a)?;
        let to = *placement.get(&b)?;
        result.add_labeled_edge(from, to, edge.clone()).ok()?;
    }
    Some(result)
}
