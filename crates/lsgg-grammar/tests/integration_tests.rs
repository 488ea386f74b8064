//! End-to-end tests for the grammar.
//!
//! Each test fits a grammar on a small corpus and checks the resulting
//! store and the neighbours it proposes.
//!
//! Tests cover:
//! - Congruence on the three-node path scenarios
//! - Frequency filter post-conditions and idempotence
//! - Congruence symmetry over a fitted store
//! - Substitution locality and self-substitution identity
//! - Parallel fit equivalence (property test)
//! - Neighbour determinism, rooted neighbours and seeded sampling
//! - Half-step radii on edge-expanded graphs
//! - Ego, minor, RNA and similarity decomposers, including dissimilar donors

use std::collections::BTreeSet;

use lsgg_core::{graph_hash, GraphHash, LabeledGraph, NodeId};
use lsgg_grammar::decompose::rna::{self, RnaDecomposer};
use lsgg_grammar::{
    extract_cip, substitute_core, Decomposer, EgoDecomposer, GenericDecomposer, Grammar,
    GrammarConfig, GrammarError, LabelContraction, MinorDecomposer, Root, SimilarityDecomposer,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn path(labels: &[&str]) -> LabeledGraph {
    let mut g = LabeledGraph::undirected();
    let ids: Vec<NodeId> = labels.iter().map(|l| g.add_labeled(*l)).collect();
    for pair in ids.windows(2) {
        g.add_edge(pair[0], pair[1]).unwrap();
    }
    g
}

/// Full-step config with explicit thresholds.
fn config(radii: Vec<u32>, thickness: u32, min_cip: u32, min_interface: usize) -> GrammarConfig {
    GrammarConfig {
        radii,
        thickness,
        filter_min_cip: min_cip,
        filter_min_interface: min_interface,
        half_step: false,
    }
}

fn molecules() -> Vec<LabeledGraph> {
    vec![
        path(&["C", "C", "O"]),
        path(&["C", "N", "O"]),
        path(&["C", "C", "O"]),
        path(&["C", "N", "O"]),
        path(&["C", "S", "O"]),
    ]
}

fn hashes(graphs: impl IntoIterator<Item = LabeledGraph>) -> Vec<GraphHash> {
    graphs.into_iter().map(|g| graph_hash(&g)).collect()
}

// ---------------------------------------------------------------------------
// Congruence
// ---------------------------------------------------------------------------

#[test]
fn paths_with_different_ends_are_not_congruent() {
    let abc = path(&["A", "B", "C"]);
    let abd = path(&["A", "B", "D"]);
    let p = extract_cip(&abc, &Root::Node(NodeId(1)), 0, 1).unwrap().unwrap();
    let q = extract_cip(&abd, &Root::Node(NodeId(1)), 0, 1).unwrap().unwrap();
    assert_ne!(p.interface_hash, q.interface_hash);
}

#[test]
fn paths_with_different_middles_are_congruent() {
    let abc = path(&["A", "B", "C"]);
    let axc = path(&["A", "X", "C"]);
    let p = extract_cip(&abc, &Root::Node(NodeId(1)), 0, 1).unwrap().unwrap();
    let q = extract_cip(&axc, &Root::Node(NodeId(1)), 0, 1).unwrap().unwrap();
    assert_eq!(p.interface_hash, q.interface_hash);
    assert_ne!(p.core_hash, q.core_hash);
}

#[test]
fn congruence_is_symmetric() {
    let mut grammar =
        Grammar::new(config(vec![0, 1], 1, 1, 2), GenericDecomposer::new()).unwrap();
    grammar.fit(&molecules(), 1).unwrap();

    let store = grammar.store();
    for a in store.cips() {
        for b in store.congruent(a) {
            assert!(store.congruent(b).any(|c| c.core_hash == a.core_hash));
        }
    }
}

// ---------------------------------------------------------------------------
// Fit and filter
// ---------------------------------------------------------------------------

#[test]
fn filter_keeps_frequent_cores_only() {
    init_tracing();
    let mut grammar = Grammar::new(config(vec![0], 1, 2, 2), GenericDecomposer::new()).unwrap();
    let report = grammar.fit(&molecules(), 1).unwrap();
    assert_eq!(report.graphs, 5);
    assert!(report.filter.cores_removed > 0);

    let store = grammar.store();
    assert!(store.cips().all(|cip| cip.count >= 2));
    assert!(store.cips().all(|cip| {
        store.bucket(&cip.interface_hash).map_or(0, |b| b.len()) >= 2
    }));

    // The {C, O} interface keeps C and N; S was seen once.
    let probe = extract_cip(&molecules()[0], &Root::Node(NodeId(1)), 0, 1)
        .unwrap()
        .unwrap();
    assert_eq!(store.bucket(&probe.interface_hash).unwrap().len(), 2);

    let size = grammar.size();
    assert_eq!(grammar.filter(), Default::default());
    assert_eq!(grammar.size(), size);
}

#[test]
fn counts_are_numbers_of_graphs() {
    // The two end nodes of C-O-C share one CIP; the graph counts once.
    let corpus = vec![path(&["C", "O", "C"])];
    let mut grammar = Grammar::new(config(vec![0], 1, 1, 1), GenericDecomposer::new()).unwrap();
    grammar.fit(&corpus, 1).unwrap();
    assert!(grammar.store().cips().all(|cip| cip.count == 1));
}

#[test]
fn fitting_everything_away_leaves_an_unfit_grammar() {
    let mut grammar =
        Grammar::new(config(vec![0], 1, 100, 2), GenericDecomposer::new()).unwrap();
    grammar.fit(&molecules(), 1).unwrap();
    assert!(!grammar.is_fit());
    assert_eq!(grammar.neighbors(&molecules()[0]).unwrap().count(), 0);
}

#[test]
fn config_from_json_drives_the_grammar() {
    let config = GrammarConfig::from_json(
        r#"{"radii": [0], "thickness": 1, "filter_min_cip": 1, "half_step": false}"#,
    )
    .unwrap();
    assert_eq!(config.filter_min_interface, 2);
    let mut grammar = Grammar::new(config, GenericDecomposer::new()).unwrap();
    grammar.fit(&molecules(), 1).unwrap();
    assert!(grammar.is_fit());
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

#[test]
fn substitution_only_touches_the_core() {
    let mut grammar =
        Grammar::new(config(vec![0, 1], 1, 1, 2), GenericDecomposer::new()).unwrap();
    let corpus = molecules();
    grammar.fit(&corpus, 1).unwrap();

    let graph = path(&["C", "C", "O", "O"]);
    let mut substitutions = 0;
    for probe in grammar.extract(&graph).unwrap() {
        for donor in grammar.store().congruent(&probe) {
            let Some(result) = substitute_core(&graph, &probe, donor) else {
                continue;
            };
            substitutions += 1;
            let outside: BTreeSet<NodeId> = graph
                .node_ids()
                .into_iter()
                .filter(|id| !probe.core_nodes.contains(id))
                .collect();
            for &id in &outside {
                assert_eq!(result.node(id), graph.node(id));
                let before: Vec<NodeId> = graph
                    .neighbors(id)
                    .into_iter()
                    .filter(|n| outside.contains(n))
                    .collect();
                let after: Vec<NodeId> = result
                    .neighbors(id)
                    .into_iter()
                    .filter(|n| outside.contains(n))
                    .collect();
                assert_eq!(before, after);
                if !probe.interface_nodes.contains(&id) {
                    assert_eq!(result.neighbors(id), graph.neighbors(id));
                }
            }
        }
    }
    assert!(substitutions > 0);
}

#[test]
fn self_substitution_is_identity() {
    let graph = path(&["C", "N", "O", "C", "C"]);
    for radius in 0..3 {
        for id in graph.node_ids() {
            let Some(cip) = extract_cip(&graph, &Root::Node(id), radius, 1).unwrap() else {
                continue;
            };
            let result = substitute_core(&graph, &cip, &cip).unwrap();
            assert_eq!(graph_hash(&result), graph_hash(&graph));
        }
    }
}

// ---------------------------------------------------------------------------
// Parallel fit
// ---------------------------------------------------------------------------

const LABELS: [&str; 3] = ["A", "B", "C"];

fn corpus_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..LABELS.len(), 2..6), 1..8)
}

fn counts(grammar: &Grammar<GenericDecomposer>) -> Vec<(GraphHash, GraphHash, u32)> {
    let mut out: Vec<_> = grammar
        .store()
        .cips()
        .map(|cip| (cip.interface_hash, cip.core_hash, cip.count))
        .collect();
    out.sort();
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn parallel_fit_matches_sequential(corpus in corpus_strategy(), workers in 2usize..5) {
        let graphs: Vec<LabeledGraph> = corpus
            .iter()
            .map(|labels| path(&labels.iter().map(|&l| LABELS[l]).collect::<Vec<_>>()))
            .collect();

        let mut sequential =
            Grammar::new(config(vec![0, 1], 1, 1, 1), GenericDecomposer::new()).unwrap();
        sequential.fit(&graphs, 1).unwrap();
        let mut parallel =
            Grammar::new(config(vec![0, 1], 1, 1, 1), GenericDecomposer::new()).unwrap();
        parallel.fit(&graphs, workers).unwrap();

        prop_assert_eq!(counts(&sequential), counts(&parallel));
    }
}

// ---------------------------------------------------------------------------
// Neighbours
// ---------------------------------------------------------------------------

#[test]
fn neighbors_are_reproducible() {
    let mut grammar =
        Grammar::new(config(vec![0, 1], 1, 1, 2), GenericDecomposer::new()).unwrap();
    grammar.fit(&molecules(), 2).unwrap();

    let graph = path(&["C", "C", "O"]);
    let first = hashes(grammar.neighbors(&graph).unwrap());
    let second = hashes(grammar.neighbors(&graph).unwrap());
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert!(first.contains(&graph_hash(&path(&["C", "N", "O"]))));
}

#[test]
fn neighbors_root_restricts_the_location() {
    let mut grammar = Grammar::new(config(vec![0], 1, 1, 2), GenericDecomposer::new()).unwrap();
    grammar.fit(&molecules(), 1).unwrap();

    let graph = path(&["C", "C", "O"]);
    let middle = hashes(grammar.neighbors_root(&graph, &Root::Node(NodeId(1))).unwrap());
    let expected: BTreeSet<GraphHash> = [path(&["C", "N", "O"]), path(&["C", "S", "O"])]
        .iter()
        .map(graph_hash)
        .collect();
    assert_eq!(middle.into_iter().collect::<BTreeSet<_>>(), expected);

    assert!(matches!(
        grammar.neighbors_root(&graph, &Root::Node(NodeId(42))),
        Err(GrammarError::RootNotFound { .. })
    ));
    assert!(matches!(
        grammar.neighbors_root(&graph, &Root::Set(vec![])),
        Err(GrammarError::EmptyRoot)
    ));
}

#[test]
fn seeded_sampling_is_reproducible() {
    let mut grammar =
        Grammar::new(config(vec![0, 1], 1, 1, 2), GenericDecomposer::new()).unwrap();
    grammar.fit(&molecules(), 1).unwrap();
    let graph = path(&["C", "C", "O"]);

    let all = grammar.neighbors(&graph).unwrap().count();
    let a = grammar
        .neighbors_sample(&graph, 2, &mut ChaCha8Rng::seed_from_u64(7))
        .unwrap();
    let b = grammar
        .neighbors_sample(&graph, 2, &mut ChaCha8Rng::seed_from_u64(7))
        .unwrap();
    assert_eq!(a.len(), 2.min(all));
    assert_eq!(hashes(a), hashes(b));

    let everything = grammar
        .neighbors_sample(&graph, usize::MAX, &mut ChaCha8Rng::seed_from_u64(1))
        .unwrap();
    assert_eq!(everything.len(), all);
}

#[test]
fn half_steps_on_expanded_graphs() {
    let corpus: Vec<LabeledGraph> = molecules().iter().map(|g| g.expand_edges()).collect();
    let config = GrammarConfig {
        filter_min_cip: 1,
        ..GrammarConfig::default()
    };
    let mut grammar = Grammar::new(config, GenericDecomposer::new()).unwrap();
    grammar.fit(&corpus, 1).unwrap();

    let neighbours = hashes(grammar.neighbors(&corpus[0]).unwrap());
    assert!(neighbours.contains(&graph_hash(&corpus[1])));
    // Edge nodes are never roots.
    assert!(grammar
        .decomposer()
        .roots(&corpus[0])
        .iter()
        .all(|root| !corpus[0].node(root.nodes()[0]).unwrap().is_edge));
}

// ---------------------------------------------------------------------------
// Decomposer variants
// ---------------------------------------------------------------------------

#[test]
fn ego_roots_swap_node_pairs() {
    let edges = |g: &LabeledGraph| -> Vec<Vec<NodeId>> {
        g.edges().into_iter().map(|(a, b, _)| vec![a, b]).collect()
    };
    let corpus = vec![path(&["A", "B", "B", "C"]), path(&["A", "X", "X", "C"])];
    let mut grammar = Grammar::new(config(vec![0], 1, 1, 2), EgoDecomposer::new(edges)).unwrap();
    grammar.fit(&corpus, 1).unwrap();

    let neighbours = hashes(grammar.neighbors(&corpus[0]).unwrap());
    assert!(neighbours.contains(&graph_hash(&corpus[1])));
}

#[test]
fn minor_grammar_substitutes_contracted_groups() {
    let decomposer = MinorDecomposer::new(LabelContraction, 1);
    let corpus = vec![
        decomposer.prepare(path(&["A", "A", "B", "B", "C", "C"])).unwrap(),
        decomposer.prepare(path(&["A", "A", "X", "X", "C", "C"])).unwrap(),
    ];
    let mut grammar = Grammar::new(config(vec![0], 1, 1, 2), decomposer).unwrap();
    grammar.fit(&corpus, 1).unwrap();
    assert!(grammar.is_fit());

    let neighbours: Vec<GraphHash> = grammar
        .neighbors(&corpus[0])
        .unwrap()
        .map(|g| graph_hash(g.base_graph()))
        .collect();
    assert!(neighbours.contains(&graph_hash(corpus[1].base_graph())));
}

#[test]
fn rna_grammar_keeps_valid_molecules() {
    let corpus: Vec<LabeledGraph> = ["GGAAAACC", "GGAUAACC", "GGAAUACC", "GGACAACC"]
        .iter()
        .map(|seq| rna::from_dot_bracket(seq, "((....))").unwrap())
        .collect();
    let config = GrammarConfig {
        filter_min_cip: 1,
        ..GrammarConfig::default()
    };
    let mut grammar = Grammar::new(config, RnaDecomposer::new()).unwrap();
    grammar.fit(&corpus, 2).unwrap();

    let neighbours: Vec<LabeledGraph> = grammar.neighbors(&corpus[0]).unwrap().collect();
    assert!(!neighbours.is_empty());
    assert!(neighbours.iter().all(rna::is_rna));
    let sequences: Vec<String> = neighbours.iter().filter_map(rna::sequence).collect();
    assert!(sequences.iter().any(|s| s == "GGAUAACC"));
    assert!(sequences.iter().all(|s| s.starts_with('G') && s.ends_with('C')));
}

#[test]
fn similarity_grammar_scores_and_reports_vectors() {
    init_tracing();
    let corpus = vec![
        path(&["A", "B", "C", "D", "E", "F", "G"]),
        path(&["A", "B", "C", "X", "E", "F", "G"]),
        path(&["A", "B", "C", "D", "E", "F", "G"]),
    ];
    let decomposer = SimilarityDecomposer::new(GenericDecomposer::new(), 4);
    let mut grammar = Grammar::new(config(vec![0], 1, 1, 2), decomposer).unwrap();
    grammar.fit(&corpus, 1).unwrap();

    assert!(grammar.store().periphery_vectors() > 0);
    assert!(grammar.to_string().contains("#periphery-vectors"));

    let probe = grammar
        .extract_root(&corpus[0], &Root::Node(NodeId(3)))
        .unwrap()
        .remove(0);
    let scored = grammar.store().congruent_scored(&probe);
    assert_eq!(scored.len(), 1);
    assert!((scored[0].1 - 1.0).abs() < 1e-9);

    let sampled = grammar
        .neighbors_sample(&corpus[0], 1, &mut ChaCha8Rng::seed_from_u64(3))
        .unwrap();
    assert_eq!(hashes(sampled), vec![graph_hash(&corpus[1])]);
}

#[test]
fn dissimilar_donors_are_not_neighbours() {
    init_tracing();
    let corpus = vec![
        path(&["A", "B", "C", "D", "E", "F", "G"]),
        path(&["P", "Q", "C", "X", "E", "R", "S"]),
    ];
    let root = Root::Node(NodeId(3));

    // Without periphery features the two middles are interchangeable.
    let mut plain = Grammar::new(config(vec![0], 1, 1, 2), GenericDecomposer::new()).unwrap();
    plain.fit(&corpus, 1).unwrap();
    assert_eq!(plain.neighbors_root(&corpus[0], &root).unwrap().count(), 1);

    // Their peripheries share no label, so they score zero.
    let decomposer = SimilarityDecomposer::new(GenericDecomposer::new(), 4);
    let mut grammar = Grammar::new(config(vec![0], 1, 1, 2), decomposer).unwrap();
    grammar.fit(&corpus, 1).unwrap();

    let probe = grammar.extract_root(&corpus[0], &root).unwrap().remove(0);
    assert_eq!(grammar.store().congruent(&probe).count(), 1);
    assert!(grammar.store().congruent_scored(&probe).is_empty());
    assert_eq!(grammar.neighbors_root(&corpus[0], &root).unwrap().count(), 0);
    assert_eq!(grammar.neighbors(&corpus[0]).unwrap().count(), 0);
}
