//! Grammar configuration.
//!
//! Radii and thickness are given in half steps by default: with
//! `half_step` set, every configured value is doubled before extraction.
//! On an edge-expanded graph (see
//! [`LabeledGraph::expand_edges`](lsgg_core::LabeledGraph::expand_edges))
//! one step between two original nodes is two hops, so a configured radius
//! of 1 reaches the direct neighbours.

use serde::{Deserialize, Serialize};

use crate::error::GrammarError;

/// Configuration of a [`Grammar`](crate::grammar::Grammar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// Core radii; every root is extracted once per radius.
    pub radii: Vec<u32>,
    /// Interface thickness beyond the core. Must be positive.
    pub thickness: u32,
    /// Cores seen fewer times than this under an interface are pruned.
    pub filter_min_cip: u32,
    /// Interfaces left with fewer distinct cores than this are pruned.
    pub filter_min_interface: usize,
    /// Double radii and thickness before use.
    pub half_step: bool,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig {
            radii: vec![0, 1],
            thickness: 1,
            filter_min_cip: 2,
            filter_min_interface: 2,
            half_step: true,
        }
    }
}

impl GrammarConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, GrammarError> {
        let config: GrammarConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that can never produce a usable CIP.
    pub fn validate(&self) -> Result<(), GrammarError> {
        if self.radii.is_empty() {
            return Err(GrammarError::InvalidConfig {
                reason: "radius list is empty".into(),
            });
        }
        if self.thickness == 0 {
            return Err(GrammarError::InvalidConfig {
                reason: "thickness must be positive, a core needs an interface".into(),
            });
        }
        let widest = self.radii.iter().copied().max().unwrap_or(0);
        let horizon = self
            .scale(widest)
            .zip(self.scale(self.thickness))
            .and_then(|(r, t)| r.checked_add(t));
        if horizon.is_none() {
            return Err(GrammarError::InvalidConfig {
                reason: format!(
                    "radius {} with thickness {} exceeds the distance range",
                    widest, self.thickness
                ),
            });
        }
        Ok(())
    }

    /// Radii after half-step scaling, ascending and deduplicated. Values
    /// past the distance range saturate; `validate` rejects them.
    pub fn effective_radii(&self) -> Vec<u32> {
        let mut radii: Vec<u32> = self
            .radii
            .iter()
            .map(|&r| self.scale(r).unwrap_or(u32::MAX))
            .collect();
        radii.sort_unstable();
        radii.dedup();
        radii
    }

    /// Thickness after half-step scaling.
    pub fn effective_thickness(&self) -> u32 {
        self.scale(self.thickness).unwrap_or(u32::MAX)
    }

    fn scale(&self, value: u32) -> Option<u32> {
        if self.half_step {
            value.checked_mul(2)
        } else {
            Some(value)
        }
    }
}
