//! Local substitution graph grammar.
//!
//! A grammar learns interchangeable graph fragments from a corpus and uses
//! them to propose structural neighbours of new graphs.
//!
//! - [`cip`]: core-interface-pair extraction and hashing
//! - [`store`]: the production store, frequency filter and congruence lookup
//! - [`substitute`]: core replacement
//! - [`decompose`]: pluggable graph representations (generic, ego, minor, RNA)
//! - [`similarity`]: periphery features for similarity-biased congruence
//! - [`grammar`]: [`Grammar`], tying the above together
//! - [`config`]: [`GrammarConfig`]
//! - [`error`]: [`GrammarError`]

pub mod cip;
pub mod config;
pub mod decompose;
pub mod error;
pub mod grammar;
pub mod similarity;
pub mod store;
pub mod substitute;

// Re-export commonly used types
pub use cip::{extract_cip, extract_cips, CoreInterfacePair, Root};
pub use config::GrammarConfig;
pub use decompose::minor::{Abstraction, LabelContraction, MinorDecomposer, MinorGraph};
pub use decompose::rna::RnaDecomposer;
pub use decompose::{Decomposer, EgoDecomposer, GenericDecomposer};
pub use error::GrammarError;
pub use grammar::{FitReport, Grammar, GrammarSize};
pub use similarity::{Periphery, SimilarityDecomposer, SparseVector};
pub use store::{FilterReport, ProductionStore};
pub use substitute::substitute_core;
