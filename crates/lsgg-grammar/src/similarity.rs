//! Similarity-biased congruence.
//!
//! Every CIP gets a periphery: the nodes beyond its interface, at distance
//! in `(radius + 1, radius + periphery_thickness]` from the root. The
//! periphery is turned into a hashed, L2-normalized sparse feature vector
//! of canonical node names. Congruence lookup is unchanged; candidates are
//! scored by the best dot product between any of their stored vectors and
//! the probe's vector, and candidates scoring `<= 0` are dropped.
//!
//! Repeated observations of one CIP accumulate vectors, deduplicated by
//! the hash of the periphery subgraph.

use std::collections::{BTreeMap, BTreeSet};

use lsgg_core::hash::{annotate, hash_label, node_name, subgraph_hash};
use lsgg_core::{GraphHash, LabeledGraph, NodeId};
use serde::{Deserialize, Serialize};

use crate::cip::{horizon, root_distances, CoreInterfacePair, Root};
use crate::decompose::{Decomposer, GenericDecomposer};
use crate::error::GrammarError;

/// Default number of feature index bits.
pub const DEFAULT_FEATURE_BITS: u32 = 16;
/// Largest neighbourhood depth used for periphery features.
const FEATURE_DEPTH: u32 = 2;
/// Annotation tag for feature depth.
const DEPTH_TAG: u8 = 3;

// ---------------------------------------------------------------------------
// Sparse vectors
// ---------------------------------------------------------------------------

/// A sparse, L2-normalized feature vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: BTreeMap<u32, f64>,
}

impl SparseVector {
    /// Normalizes raw feature counts. Zero entries are dropped.
    pub fn from_counts(counts: BTreeMap<u32, f64>) -> Self {
        let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm < 1e-12 {
            return SparseVector::default();
        }
        let entries = counts
            .into_iter()
            .filter(|(_, v)| *v != 0.0)
            .map(|(k, v)| (k, v / norm))
            .collect();
        SparseVector { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Dot product; the cosine similarity for normalized vectors.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (small, large) = if self.entries.len() <= other.entries.len() {
            (&self.entries, &other.entries)
        } else {
            (&other.entries, &self.entries)
        };
        small
            .iter()
            .filter_map(|(k, v)| large.get(k).map(|w| v * w))
            .sum()
    }
}

/// Hashed features of the subgraph induced by `nodes`: one feature per node
/// and neighbourhood depth `0..=2`.
pub fn vectorize(graph: &LabeledGraph, nodes: &BTreeSet<NodeId>, feature_bits: u32) -> SparseVector {
    let mask = (1u64 << feature_bits.min(32)) - 1;
    let mut counts: BTreeMap<u32, f64> = BTreeMap::new();
    for &node in nodes {
        for depth in 0..=FEATURE_DEPTH {
            let name = node_name(graph, nodes, node, depth, |_, n| hash_label(n));
            let feature = (annotate(name, DEPTH_TAG, depth as u64).short() & mask) as u32;
            *counts.entry(feature).or_insert(0.0) += 1.0;
        }
    }
    SparseVector::from_counts(counts)
}

// ---------------------------------------------------------------------------
// Periphery
// ---------------------------------------------------------------------------

/// Periphery observations accumulated for one CIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Periphery {
    pub vectors: Vec<SparseVector>,
    /// Hashes of the periphery subgraphs behind `vectors`.
    pub hashes: BTreeSet<GraphHash>,
}

impl Periphery {
    pub fn new(vector: SparseVector, hash: GraphHash) -> Self {
        Periphery {
            vectors: vec![vector],
            hashes: BTreeSet::from([hash]),
        }
    }

    /// Appends the observations of `other` unless one of its peripheries
    /// was already seen. Returns `true` if anything was added.
    pub fn absorb(&mut self, other: &Periphery) -> bool {
        if !self.hashes.is_disjoint(&other.hashes) {
            return false;
        }
        self.vectors.extend(other.vectors.iter().cloned());
        self.hashes.extend(other.hashes.iter().copied());
        true
    }

    /// Best similarity between any stored vector and the probe's first
    /// vector. Zero when either side has no vector.
    pub fn similarity(&self, probe: &Periphery) -> f64 {
        let Some(needle) = probe.vectors.first() else {
            return 0.0;
        };
        self.vectors
            .iter()
            .map(|v| v.dot(needle))
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
            .unwrap_or(0.0)
    }
}

/// Computes the periphery of `root`. `None` when it has fewer than three
/// nodes, which is too little context to compare.
pub fn periphery_of(
    graph: &LabeledGraph,
    root: &Root,
    radius: u32,
    periphery_thickness: u32,
    feature_bits: u32,
) -> Result<Option<Periphery>, GrammarError> {
    let outer = horizon(radius, periphery_thickness)?;
    let dist = root_distances(graph, root, outer)?;
    let nodes: BTreeSet<NodeId> = dist
        .iter()
        .filter(|(_, &d)| radius.saturating_add(1) < d && d <= outer)
        .map(|(&id, _)| id)
        .collect();
    if nodes.len() <= 2 {
        return Ok(None);
    }
    let vector = vectorize(graph, &nodes, feature_bits);
    let hash = subgraph_hash(graph, &nodes, |_, n| hash_label(n));
    Ok(Some(Periphery::new(vector, hash)))
}

// ---------------------------------------------------------------------------
// Decomposer
// ---------------------------------------------------------------------------

/// Generic extraction plus periphery features.
///
/// `periphery_thickness` is in the same units the grammar hands to the
/// decomposer, i.e. after half-step scaling.
#[derive(Debug, Clone)]
pub struct SimilarityDecomposer {
    inner: GenericDecomposer,
    periphery_thickness: u32,
    feature_bits: u32,
}

impl SimilarityDecomposer {
    pub fn new(inner: GenericDecomposer, periphery_thickness: u32) -> Self {
        SimilarityDecomposer {
            inner,
            periphery_thickness,
            feature_bits: DEFAULT_FEATURE_BITS,
        }
    }

    pub fn with_feature_bits(mut self, bits: u32) -> Self {
        self.feature_bits = bits;
        self
    }
}

impl Decomposer for SimilarityDecomposer {
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
        let Some(mut cip) = self.inner.extract(graph, root, radius, thickness)? else {
            return Ok(None);
        };
        match periphery_of(graph, root, radius, self.periphery_thickness, self.feature_bits)? {
            Some(periphery) => {
                cip.periphery = Some(periphery);
                Ok(Some(cip))
            }
            None => Ok(None),
        }
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
