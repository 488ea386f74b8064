//! Two-level graphs: a base graph and a coarser abstract graph (a minor)
//! whose nodes each represent a group of base nodes.
//!
//! CIPs are anchored and sized on the abstract graph. The abstract core is
//! lifted to the base nodes it represents, and the base interface is taken
//! `base_thickness` around that lifted core. The congruence key folds the
//! base interface hash with the abstract interface hash, so two cores are
//! only swapped when both levels agree. Substitution runs on the base graph
//! and the abstraction is recomputed from the result.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use lsgg_core::hash::fold;
use lsgg_core::{GraphNode, LabeledGraph, NodeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cip::{extract_cip, CoreInterfacePair, Root};
use crate::decompose::Decomposer;
use crate::error::GrammarError;
use crate::substitute::substitute_core;

/// Salt separating minor interface hashes from plain ones.
const MINOR_SALT: u64 = 0x6d69_6e6f_72;

/// Derives the abstract graph of a base graph.
pub trait Abstraction: Send + Sync {
    /// Every non-edge node of the result must carry the base nodes it
    /// represents.
    fn abstract_graph(&self, base: &LabeledGraph) -> Result<LabeledGraph, GrammarError>;
}

/// A base graph together with its abstract graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinorGraph {
    base: LabeledGraph,
    abstraction: LabeledGraph,
}

impl MinorGraph {
    /// Pairs a base graph with a precomputed abstraction. Fails when an
    /// abstract node refers to a node the base graph does not have.
    pub fn new(base: LabeledGraph, abstraction: LabeledGraph) -> Result<Self, GrammarError> {
        for id in abstraction.node_ids() {
            let Some(node) = abstraction.node(id) else {
                continue;
            };
            if let Some(&missing) = node.represents.iter().find(|&&b| !base.contains(b)) {
                return Err(GrammarError::InvalidStructure {
                    reason: format!(
                        "abstract node {} represents {}, which is not in the base graph",
                        id, missing
                    ),
                });
            }
        }
        Ok(MinorGraph { base, abstraction })
    }

    /// Derives the abstraction from `base`.
    pub fn from_base<A: Abstraction + ?Sized>(
        base: LabeledGraph,
        abstraction: &A,
    ) -> Result<Self, GrammarError> {
        let abstract_graph = abstraction.abstract_graph(&base)?;
        Ok(MinorGraph {
            base,
            abstraction: abstract_graph,
        })
    }

    pub fn base_graph(&self) -> &LabeledGraph {
        &self.base
    }

    pub fn abstract_graph(&self) -> &LabeledGraph {
        &self.abstraction
    }
}

// ---------------------------------------------------------------------------
// LabelContraction
// ---------------------------------------------------------------------------

/// Contracts every connected group of equally labeled non-edge nodes into
/// one abstract node with that label. An edge node joins a group when all
/// of its neighbours are in it. The abstract graph is undirected.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelContraction;

/// Non-edge nodes reachable from `id` directly or through one edge node.
fn linked(base: &LabeledGraph, id: NodeId) -> BTreeSet<NodeId> {
    let mut out = BTreeSet::new();
    for next in base.neighbors(id) {
        match base.node(next) {
            Some(node) if node.is_edge => {
                out.extend(
                    base.neighbors(next)
                        .into_iter()
                        .filter(|&m| m != id && base.node(m).is_some_and(|n| !n.is_edge)),
                );
            }
            Some(_) => {
                out.insert(next);
            }
            None => {}
        }
    }
    out
}

impl Abstraction for LabelContraction {
    fn abstract_graph(&self, base: &LabeledGraph) -> Result<LabeledGraph, GrammarError> {
        let mut group_of: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut groups: Vec<(String, BTreeSet<NodeId>)> = Vec::new();

        for start in base.node_ids() {
            let Some(node) = base.node(start) else {
                continue;
            };
            if node.is_edge || group_of.contains_key(&start) {
                continue;
            }
            let label = node.label.clone();
            let index = groups.len();
            let mut members = BTreeSet::from([start]);
            group_of.insert(start, index);
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for next in linked(base, current) {
                    let same_label = base.node(next).is_some_and(|n| n.label == label);
                    if same_label && !group_of.contains_key(&next) {
                        group_of.insert(next, index);
                        members.insert(next);
                        queue.push_back(next);
                    }
                }
            }
            groups.push((label, members));
        }

        for id in base.node_ids() {
            if !base.node(id).is_some_and(|n| n.is_edge) {
                continue;
            }
            let owners: BTreeSet<usize> = base
                .neighbors(id)
                .iter()
                .filter_map(|m| group_of.get(m).copied())
                .collect();
            if owners.len() == 1 {
                if let Some(&owner) = owners.iter().next() {
                    groups[owner].1.insert(id);
                }
            }
        }

        let mut abstraction = LabeledGraph::undirected();
        let ids: Vec<NodeId> = groups
            .into_iter()
            .map(|(label, members)| abstraction.add_node(GraphNode::contracted(label, members)))
            .collect();

        let mut links: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (&node, &group) in &group_of {
            for next in linked(base, node) {
                if let Some(&other) = group_of.get(&next) {
                    if other != group {
                        links.insert((group.min(other), group.max(other)));
                    }
                }
            }
        }
        for (a, b) in links {
            abstraction.add_edge(ids[a], ids[b])?;
        }
        Ok(abstraction)
    }
}

// ---------------------------------------------------------------------------
// MinorDecomposer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MinorDecomposer<A> {
    abstraction: A,
    base_thickness: u32,
}

impl<A: Abstraction> MinorDecomposer<A> {
    /// `base_thickness` is the interface thickness on the base graph, in the
    /// same units as the grammar's effective thickness.
    pub fn new(abstraction: A, base_thickness: u32) -> Self {
        MinorDecomposer {
            abstraction,
            base_thickness,
        }
    }

    /// Builds the two-level graph for a base graph.
    pub fn prepare(&self, base: LabeledGraph) -> Result<MinorGraph, GrammarError> {
        MinorGraph::from_base(base, &self.abstraction)
    }
}

impl<A: Abstraction> Decomposer for MinorDecomposer<A> {
    type Graph = MinorGraph;

    fn roots(&self, graph: &MinorGraph) -> Vec<Root> {
        let abstraction = graph.abstract_graph();
        abstraction
            .node_ids()
            .into_iter()
            .filter(|&id| abstraction.node(id).is_some_and(|n| !n.is_edge))
            .map(Root::Node)
            .collect()
    }

    /// The returned CIP describes the base graph: its core is the lifted
    /// abstract core, its radius is 0 and its distances are measured from
    /// that core.
    fn extract(
        &self,
        graph: &MinorGraph,
        root: &Root,
        radius: u32,
        thickness: u32,
    ) -> Result<Option<CoreInterfacePair>, GrammarError> {
        let Some(abstract_cip) = extract_cip(graph.abstract_graph(), root, radius, thickness)?
        else {
            return Ok(None);
        };

        let lifted: BTreeSet<NodeId> = abstract_cip
            .core_nodes
            .iter()
            .filter_map(|&id| graph.abstract_graph().node(id))
            .flat_map(|node| node.represents.iter().copied())
            .collect();
        if lifted.is_empty() {
            trace!(%root, "abstract core represents no base nodes");
            return Ok(None);
        }

        let base_root = Root::Set(lifted.into_iter().collect());
        let Some(mut cip) = extract_cip(graph.base_graph(), &base_root, 0, self.base_thickness)?
        else {
            return Ok(None);
        };
        cip.interface_hash = fold(
            &[cip.interface_hash, abstract_cip.interface_hash],
            MINOR_SALT,
        );
        Ok(Some(cip))
    }

    fn substitute(
        &self,
        graph: &MinorGraph,
        probe: &CoreInterfacePair,
        donor: &CoreInterfacePair,
    ) -> Option<MinorGraph> {
        let base = substitute_core(graph.base_graph(), probe, donor)?;
        match MinorGraph::from_base(base, &self.abstraction) {
            Ok(minor) => Some(minor),
            Err(err) => {
                debug!(%err, "substituted base graph has no abstraction");
                None
            }
        }
    }
}
