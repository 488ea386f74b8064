//! The production store: interface hash -> core hash -> CIP.
//!
//! Insertion is a count increment keyed by hashes, so it is commutative and
//! associative over the corpus. Partial stores built from disjoint corpus
//! chunks can be [`merge`](ProductionStore::merge)d in any order and give
//! the same counts as a single sequential pass.
//!
//! Buckets and cores iterate in first-insertion order (`IndexMap`), which
//! keeps neighbour generation reproducible for a given fit.

use std::collections::BTreeSet;

use indexmap::map::Entry;
use indexmap::IndexMap;
use lsgg_core::GraphHash;

use crate::cip::CoreInterfacePair;
use crate::similarity::Periphery;

/// Alternative cores sharing one interface.
pub type Bucket = IndexMap<GraphHash, CoreInterfacePair>;

/// Outcome of [`ProductionStore::filter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// CIPs dropped, including those removed together with their interface.
    pub cores_removed: usize,
    /// Interface buckets dropped.
    pub interfaces_removed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProductionStore {
    productions: IndexMap<GraphHash, Bucket>,
}

impl ProductionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    /// Inserts one CIP. An existing (interface, core) entry gains the CIP's
    /// count and absorbs its periphery observations.
    pub fn insert(&mut self, cip: CoreInterfacePair) {
        let bucket = self.productions.entry(cip.interface_hash).or_default();
        match bucket.entry(cip.core_hash) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get_mut();
                stored.count += cip.count;
                absorb_periphery(stored, cip.periphery);
            }
            Entry::Vacant(slot) => {
                slot.insert(cip);
            }
        }
    }

    /// Inserts the CIPs extracted from one graph. A combination seen several
    /// times in the same graph counts once, so counts are numbers of graphs.
    pub fn observe_graph(&mut self, cips: Vec<CoreInterfacePair>) {
        let mut seen: IndexMap<(GraphHash, GraphHash), CoreInterfacePair> = IndexMap::new();
        for cip in cips {
            match seen.entry((cip.interface_hash, cip.core_hash)) {
                Entry::Occupied(mut slot) => absorb_periphery(slot.get_mut(), cip.periphery),
                Entry::Vacant(slot) => {
                    slot.insert(cip);
                }
            }
        }
        for (_, mut cip) in seen {
            cip.count = 1;
            self.insert(cip);
        }
    }

    /// Adds every entry of `other`, summing counts.
    pub fn merge(&mut self, other: ProductionStore) {
        for (_, bucket) in other.productions {
            for (_, cip) in bucket {
                self.insert(cip);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Filtering
    // -----------------------------------------------------------------------

    /// Drops cores seen fewer than `min_cip` times, then interfaces left with
    /// fewer than `min_interface` cores. Empty interfaces are always dropped.
    /// Running it twice with the same thresholds changes nothing.
    pub fn filter(&mut self, min_cip: u32, min_interface: usize) -> FilterReport {
        let mut report = FilterReport::default();
        self.productions.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|_, cip| cip.count >= min_cip);
            report.cores_removed += before - bucket.len();

            if bucket.is_empty() || bucket.len() < min_interface {
                report.cores_removed += bucket.len();
                report.interfaces_removed += 1;
                false
            } else {
                true
            }
        });
        report
    }

    // -----------------------------------------------------------------------
    // Congruence
    // -----------------------------------------------------------------------

    /// Stored CIPs with the probe's interface hash and a different core.
    pub fn congruent<'a>(
        &'a self,
        probe: &CoreInterfacePair,
    ) -> impl Iterator<Item = &'a CoreInterfacePair> + 'a {
        let core = probe.core_hash;
        self.productions
            .get(&probe.interface_hash)
            .into_iter()
            .flat_map(|bucket| bucket.values())
            .filter(move |cip| cip.core_hash != core)
    }

    /// Congruent CIPs with a weight. Without a probe periphery every
    /// candidate weighs 1.0; otherwise the weight is the periphery
    /// similarity and candidates scoring `<= 0` are left out.
    pub fn congruent_scored<'a>(
        &'a self,
        probe: &CoreInterfacePair,
    ) -> Vec<(&'a CoreInterfacePair, f64)> {
        match &probe.periphery {
            None => self.congruent(probe).map(|cip| (cip, 1.0)).collect(),
            Some(needle) => self
                .congruent(probe)
                .filter_map(|cip| {
                    let score = cip
                        .periphery
                        .as_ref()
                        .map_or(0.0, |stored| stored.similarity(needle));
                    (score > 0.0).then_some((cip, score))
                })
                .collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn get(&self, interface: &GraphHash, core: &GraphHash) -> Option<&CoreInterfacePair> {
        self.productions.get(interface)?.get(core)
    }

    pub fn bucket(&self, interface: &GraphHash) -> Option<&Bucket> {
        self.productions.get(interface)
    }

    /// Every stored CIP, bucket by bucket.
    pub fn cips(&self) -> impl Iterator<Item = &CoreInterfacePair> {
        self.productions.values().flat_map(|bucket| bucket.values())
    }

    pub fn interface_count(&self) -> usize {
        self.productions.len()
    }

    /// Number of distinct core hashes across all interfaces.
    pub fn core_count(&self) -> usize {
        self.cips().map(|cip| cip.core_hash).collect::<BTreeSet<_>>().len()
    }

    pub fn cip_count(&self) -> usize {
        self.productions.values().map(Bucket::len).sum()
    }

    /// Ordered (probe, donor) pairs available: `k * (k - 1)` per interface
    /// with `k` cores.
    pub fn production_count(&self) -> usize {
        self.productions
            .values()
            .map(|bucket| bucket.len() * bucket.len().saturating_sub(1))
            .sum()
    }

    /// Sum of all occurrence counts.
    pub fn count_sum(&self) -> u64 {
        self.cips().map(|cip| cip.count as u64).sum()
    }

    /// Total periphery vectors held by the similarity variant.
    pub fn periphery_vectors(&self) -> usize {
        self.cips()
            .filter_map(|cip| cip.periphery.as_ref())
            .map(|p| p.vectors.len())
            .sum()
    }
}

fn absorb_periphery(stored: &mut CoreInterfacePair, incoming: Option<Periphery>) {
    let Some(incoming) = incoming else {
        return;
    };
    match stored.periphery.as_mut() {
        Some(mine) => {
            mine.absorb(&incoming);
        }
        None => stored.periphery = Some(incoming),
    }
}
