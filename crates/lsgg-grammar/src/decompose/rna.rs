//! Folded RNA graphs.
//!
//! A sequence with a dot-bracket secondary structure becomes a directed,
//! edge-expanded graph: one node per nucleotide, a `-` edge node between
//! consecutive nucleotides (backbone) and a `=` edge node between paired
//! ones. The first and last nucleotides carry protected markers, so a core
//! containing an end can only be replaced by a core containing the same
//! end.
//!
//! Folding a sequence is left to the caller.

use std::collections::BTreeSet;

use lsgg_core::{GraphNode, LabeledGraph, NodeId};
use tracing::trace;

use crate::cip::{CoreInterfacePair, Root};
use crate::decompose::{Decomposer, GenericDecomposer};
use crate::error::GrammarError;

/// Marker on the first nucleotide.
pub const START_MARKER: u64 = 696_969;
/// Marker on the last nucleotide.
pub const END_MARKER: u64 = 123_123_123;
/// Label of backbone edge nodes.
pub const BACKBONE: &str = "-";
/// Label of base-pair edge nodes.
pub const BOND: &str = "=";

/// Builds the RNA graph of `sequence` folded as `structure`.
pub fn from_dot_bracket(sequence: &str, structure: &str) -> Result<LabeledGraph, GrammarError> {
    let bases: Vec<char> = sequence.chars().collect();
    let brackets: Vec<char> = structure.chars().collect();
    if bases.is_empty() {
        return Err(GrammarError::InvalidStructure {
            reason: "empty sequence".into(),
        });
    }
    if bases.len() != brackets.len() {
        return Err(GrammarError::InvalidStructure {
            reason: format!(
                "sequence has {} nucleotides but structure has {} positions",
                bases.len(),
                brackets.len()
            ),
        });
    }

    let mut graph = LabeledGraph::directed();
    let nucleotides: Vec<NodeId> = bases
        .iter()
        .map(|base| graph.add_labeled(base.to_string()))
        .collect();

    for pair in nucleotides.windows(2) {
        link(&mut graph, pair[0], pair[1], BACKBONE)?;
    }

    let mut open: Vec<usize> = Vec::new();
    for (position, bracket) in brackets.iter().enumerate() {
        match bracket {
            '(' => open.push(position),
            ')' => {
                let Some(partner) = open.pop() else {
                    return Err(GrammarError::InvalidStructure {
                        reason: format!("unmatched ')' at position {}", position),
                    });
                };
                link(&mut graph, nucleotides[partner], nucleotides[position], BOND)?;
            }
            '.' => {}
            other => {
                return Err(GrammarError::InvalidStructure {
                    reason: format!("unexpected '{}' at position {}", other, position),
                });
            }
        }
    }
    if let Some(position) = open.pop() {
        return Err(GrammarError::InvalidStructure {
            reason: format!("unmatched '(' at position {}", position),
        });
    }

    let first = nucleotides[0];
    let last = nucleotides[nucleotides.len() - 1];
    graph.set_marker(first, START_MARKER)?;
    if last != first {
        graph.set_marker(last, END_MARKER)?;
    }
    Ok(graph)
}

fn link(graph: &mut LabeledGraph, from: NodeId, to: NodeId, label: &str) -> Result<(), GrammarError> {
    let edge = graph.add_node(GraphNode::edge(label));
    graph.add_edge(from, edge)?;
    graph.add_edge(edge, to)?;
    Ok(())
}

/// The marked start and end nucleotides, if each is unique.
pub fn backbone_ends(graph: &LabeledGraph) -> Option<(NodeId, NodeId)> {
    let with = |marker: u64| -> Option<NodeId> {
        let mut found = graph
            .markers()
            .iter()
            .filter(|(_, &m)| m == marker)
            .map(|(&id, _)| id);
        let id = found.next()?;
        found.next().is_none().then_some(id)
    };
    let start = with(START_MARKER)?;
    let end = match with(END_MARKER) {
        Some(end) => end,
        // A single nucleotide carries only the start marker.
        None if graph.markers().len() == 1 => start,
        None => return None,
    };
    Some((start, end))
}

/// Next nucleotide along the backbone.
fn backbone_successor(graph: &LabeledGraph, id: NodeId) -> Option<NodeId> {
    let mut next = graph
        .successors(id)
        .into_iter()
        .filter(|&e| graph.node(e).is_some_and(|n| n.is_edge && n.label == BACKBONE))
        .flat_map(|e| graph.successors(e));
    let found = next.next()?;
    next.next().is_none().then_some(found)
}

/// Reads the nucleotide sequence from start to end. `None` when the
/// backbone is broken, branched or cyclic.
pub fn sequence(graph: &LabeledGraph) -> Option<String> {
    let (start, end) = backbone_ends(graph)?;
    let mut visited = BTreeSet::from([start]);
    let mut out = graph.node(start)?.label.clone();
    let mut current = start;
    while current != end {
        current = backbone_successor(graph, current)?;
        if !visited.insert(current) {
            return None;
        }
        out.push_str(&graph.node(current)?.label);
    }
    if backbone_successor(graph, end).is_some() {
        return None;
    }
    Some(out)
}

/// True when the backbone runs from the start marker to the end marker
/// through every nucleotide and the graph is in one piece.
pub fn is_rna(graph: &LabeledGraph) -> bool {
    let Some(seq) = sequence(graph) else {
        return false;
    };
    let nucleotides = graph
        .node_ids()
        .into_iter()
        .filter(|&id| graph.node(id).is_some_and(|n| !n.is_edge))
        .count();
    seq.chars().count() == nucleotides && graph.is_connected()
}

/// Generic extraction on RNA graphs; substitutions that do not leave a
/// valid RNA graph are dropped.
#[derive(Debug, Clone, Default)]
pub struct RnaDecomposer {
    inner: GenericDecomposer,
}

impl RnaDecomposer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decomposer for RnaDecomposer {
    type Graph = LabeledGraph;

    fn roots(&self, graph: &LabeledGraph) -> Vec<Root> {
        self.inner.roots(graph)
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
        let result = self.inner.substitute(graph, probe, donor)?;
        if !is_rna(&result) {
            trace!(root = %probe.root, "substitution rejected: result is not RNA");
            return None;
        }
        Some(result)
    }
}
