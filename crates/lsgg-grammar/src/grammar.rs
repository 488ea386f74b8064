//! The grammar: fit a production store on a corpus, then propose
//! structural neighbours of new graphs.

use std::fmt;

use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::cip::{CoreInterfacePair, Root};
use crate::config::GrammarConfig;
use crate::decompose::Decomposer;
use crate::error::GrammarError;
use crate::store::{FilterReport, ProductionStore};

/// Store dimensions, as reported by [`Grammar::size`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrammarSize {
    pub interfaces: usize,
    pub cores: usize,
    pub cips: usize,
    /// Ordered (probe, donor) pairs: `k * (k - 1)` per interface.
    pub productions: usize,
}

/// Summary of one [`Grammar::fit`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FitReport {
    pub graphs: usize,
    pub cips_extracted: usize,
    pub filter: FilterReport,
    /// Size after filtering.
    pub size: GrammarSize,
}

/// A local substitution graph grammar over the graphs of decomposer `D`.
#[derive(Debug, Clone)]
pub struct Grammar<D> {
    config: GrammarConfig,
    decomposer: D,
    radii: Vec<u32>,
    thickness: u32,
    store: ProductionStore,
}

impl<D: Decomposer> Grammar<D> {
    /// Creates an empty grammar. Fails on an invalid configuration.
    pub fn new(config: GrammarConfig, decomposer: D) -> Result<Self, GrammarError> {
        config.validate()?;
        Ok(Grammar {
            radii: config.effective_radii(),
            thickness: config.effective_thickness(),
            config,
            decomposer,
            store: ProductionStore::new(),
        })
    }

    pub fn config(&self) -> &GrammarConfig {
        &self.config
    }

    pub fn decomposer(&self) -> &D {
        &self.decomposer
    }

    pub fn store(&self) -> &ProductionStore {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Extraction
    // -----------------------------------------------------------------------

    /// Every CIP of `graph`: each root at each effective radius.
    pub fn extract(&self, graph: &D::Graph) -> Result<Vec<CoreInterfacePair>, GrammarError> {
        extract_graph(&self.decomposer, &self.radii, self.thickness, graph)
    }

    /// The CIPs of one root at each effective radius.
    pub fn extract_root(
        &self,
        graph: &D::Graph,
        root: &Root,
    ) -> Result<Vec<CoreInterfacePair>, GrammarError> {
        self.decomposer
            .extract_all(graph, root, &self.radii, self.thickness)
    }

    // -----------------------------------------------------------------------
    // Fitting
    // -----------------------------------------------------------------------

    /// Adds the CIPs of every corpus graph to the store, then filters.
    ///
    /// With `parallelism > 1` the corpus is split into that many chunks,
    /// each chunk is extracted into its own store on a rayon pool, and the
    /// partial stores are merged in corpus order. The resulting counts are
    /// the same as for a sequential fit. If any graph fails, the error is
    /// returned and the store is left as it was.
    pub fn fit(
        &mut self,
        corpus: &[D::Graph],
        parallelism: usize,
    ) -> Result<FitReport, GrammarError> {
        let (partial, cips_extracted) = if parallelism > 1 && corpus.len() > 1 {
            let chunk_size = corpus.len().div_ceil(parallelism);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(parallelism)
                .build()?;
            let (decomposer, radii, thickness) = (&self.decomposer, &self.radii, self.thickness);
            let partials: Vec<(ProductionStore, usize)> = pool.install(|| {
                corpus
                    .par_chunks(chunk_size)
                    .map(|chunk| store_chunk(decomposer, radii, thickness, chunk))
                    .collect::<Result<Vec<_>, GrammarError>>()
            })?;

            let mut merged = ProductionStore::new();
            let mut extracted = 0;
            for (store, count) in partials {
                merged.merge(store);
                extracted += count;
            }
            (merged, extracted)
        } else {
            store_chunk(&self.decomposer, &self.radii, self.thickness, corpus)?
        };

        self.store.merge(partial);
        info!(
            graphs = corpus.len(),
            cips = cips_extracted,
            parallelism,
            "grammar fit: {}",
            self
        );
        let filter = self.filter();

        Ok(FitReport {
            graphs: corpus.len(),
            cips_extracted,
            filter,
            size: self.size(),
        })
    }

    /// Applies the configured frequency filter.
    pub fn filter(&mut self) -> FilterReport {
        let before = self.size();
        let report = self
            .store
            .filter(self.config.filter_min_cip, self.config.filter_min_interface);
        debug!(
            before = before.cips,
            after = self.store.cip_count(),
            cores_removed = report.cores_removed,
            interfaces_removed = report.interfaces_removed,
            "frequency filter applied"
        );
        report
    }

    // -----------------------------------------------------------------------
    // Neighbours
    // -----------------------------------------------------------------------

    /// All graphs one substitution away from `graph`.
    ///
    /// Extraction happens up front, so a bad graph fails here; substitution
    /// happens lazily as the iterator is advanced. Calling it again yields
    /// the same sequence. With periphery features, donors scoring `<= 0`
    /// against the probe are skipped.
    pub fn neighbors<'a>(
        &'a self,
        graph: &'a D::Graph,
    ) -> Result<impl Iterator<Item = D::Graph> + 'a, GrammarError> {
        let probes = self.extract(graph)?;
        Ok(self.substitutions(graph, probes))
    }

    /// Neighbours obtained by substituting at `root` only.
    pub fn neighbors_root<'a>(
        &'a self,
        graph: &'a D::Graph,
        root: &Root,
    ) -> Result<impl Iterator<Item = D::Graph> + 'a, GrammarError> {
        let probes = self.extract_root(graph, root)?;
        Ok(self.substitutions(graph, probes))
    }

    fn substitutions<'a>(
        &'a self,
        graph: &'a D::Graph,
        probes: Vec<CoreInterfacePair>,
    ) -> impl Iterator<Item = D::Graph> + 'a {
        probes.into_iter().flat_map(move |probe| {
            let donors: Vec<&'a CoreInterfacePair> = self
                .store
                .congruent_scored(&probe)
                .into_iter()
                .map(|(donor, _)| donor)
                .collect();
            if donors.is_empty() {
                trace!(root = %probe.root, radius = probe.radius, "no congruent cores");
            }
            donors
                .into_iter()
                .filter_map(move |donor| self.decomposer.substitute(graph, &probe, donor))
        })
    }

    /// Up to `n` neighbours, drawn without replacement. Each (probe, donor)
    /// proposal is weighted by its congruence score, so with periphery
    /// features closer donors tend to come first.
    pub fn neighbors_sample<R: Rng + ?Sized>(
        &self,
        graph: &D::Graph,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<D::Graph>, GrammarError> {
        let probes = self.extract(graph)?;

        // Weighted random permutation: sort by u^(1/w) descending.
        let mut proposals: Vec<(f64, &CoreInterfacePair, &CoreInterfacePair)> = Vec::new();
        for probe in &probes {
            for (donor, weight) in self.store.congruent_scored(probe) {
                let key = rng.gen::<f64>().powf(1.0 / weight);
                proposals.push((key, probe, donor));
            }
        }
        proposals.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut out = Vec::with_capacity(n.min(proposals.len()));
        for (_, probe, donor) in proposals {
            if out.len() >= n {
                break;
            }
            if let Some(result) = self.decomposer.substitute(graph, probe, donor) {
                out.push(result);
            }
        }
        trace!(requested = n, produced = out.len(), "sampled neighbours");
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// True once the store holds at least one interface.
    pub fn is_fit(&self) -> bool {
        !self.store.is_empty()
    }

    pub fn size(&self) -> GrammarSize {
        GrammarSize {
            interfaces: self.store.interface_count(),
            cores: self.store.core_count(),
            cips: self.store.cip_count(),
            productions: self.store.production_count(),
        }
    }
}

fn extract_graph<D: Decomposer>(
    decomposer: &D,
    radii: &[u32],
    thickness: u32,
    graph: &D::Graph,
) -> Result<Vec<CoreInterfacePair>, GrammarError> {
    let mut cips = Vec::new();
    for root in decomposer.roots(graph) {
        cips.extend(decomposer.extract_all(graph, &root, radii, thickness)?);
    }
    Ok(cips)
}

/// Extracts a run of corpus graphs into a fresh store.
fn store_chunk<D: Decomposer>(
    decomposer: &D,
    radii: &[u32],
    thickness: u32,
    chunk: &[D::Graph],
) -> Result<(ProductionStore, usize), GrammarError> {
    let mut store = ProductionStore::new();
    let mut extracted = 0;
    for graph in chunk {
        let cips = extract_graph(decomposer, radii, thickness, graph)?;
        extracted += cips.len();
        store.observe_graph(cips);
    }
    Ok((store, extracted))
}

impl<D: Decomposer> fmt::Display for Grammar<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size();
        write!(
            f,
            "#interfaces: {:5}   #cores: {:5}   #core-interface-pairs: {:5}   #production-rules: {:5}",
            size.interfaces, size.cores, size.cips, size.productions
        )?;
        let vectors = self.store.periphery_vectors();
        if vectors > 0 {
            write!(f, "   #periphery-vectors: {:5}", vectors)?;
        }
        Ok(())
    }
}
