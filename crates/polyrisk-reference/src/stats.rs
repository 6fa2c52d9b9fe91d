//! Population PRS distribution under Hardy-Weinberg equilibrium.
//!
//! For a variant with effect allele frequency `p` and effect size `β`, the
//! dosage has mean `2p` and variance `2p(1-p)`, so the score contributes
//! `2pβ` to the mean and `2p(1-p)β²` to the variance. Bounds are taken as
//! `mean ± 3σ`.

use std::collections::BTreeMap;

use thiserror::Error;

use polyrisk_common::ReferenceStats;

#[derive(Debug, Error, PartialEq)]
pub enum ComputeError {
    #[error("empty input: {frequencies} frequencies, {effects} effect sizes")]
    EmptyInput { frequencies: usize, effects: usize },

    #[error("allele frequency for {variant} out of bounds [0,1]: {value}")]
    InvalidFrequency { variant: String, value: f64 },

    #[error("effect size for {variant} is not finite: {value}")]
    InvalidEffect { variant: String, value: f64 },

    #[error("no variant has both a frequency and an effect size")]
    NoMatchingVariants,

    #[error("population parameters are not finite (mean {mean}, variance {variance})")]
    NotFinite { mean: f64, variance: f64 },

    #[error("population variance is zero; the score does not vary in this population")]
    Degenerate,
}

/// Mean and spread of the score before it is tied to a cache key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Variants that had both a frequency and an effect size.
    pub variants_used: usize,
}

impl Distribution {
    pub fn into_stats(self, ancestry: &str, trait_name: &str, model: &str) -> ReferenceStats {
        ReferenceStats {
            mean: self.mean,
            std: self.std,
            min: self.min,
            max: self.max,
            ancestry: ancestry.to_string(),
            trait_name: trait_name.to_string(),
            model: model.to_string(),
        }
    }
}

/// Compute the score distribution from per-variant frequencies and effects.
///
/// Variants without an effect size are skipped. Both maps are ordered, so the
/// floating-point sums are identical from run to run.
pub fn compute(
    frequencies: &BTreeMap<String, f64>,
    effect_sizes: &BTreeMap<String, f64>,
) -> Result<Distribution, ComputeError> {
    if frequencies.is_empty() || effect_sizes.is_empty() {
        return Err(ComputeError::EmptyInput {
            frequencies: frequencies.len(),
            effects: effect_sizes.len(),
        });
    }

    for (variant, &p) in frequencies {
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ComputeError::InvalidFrequency { variant: variant.clone(), value: p });
        }
        if let Some(&beta) = effect_sizes.get(variant) {
            if !beta.is_finite() {
                return Err(ComputeError::InvalidEffect { variant: variant.clone(), value: beta });
            }
        }
    }

    let mut mean = 0.0;
    let mut variance = 0.0;
    let mut used = 0usize;
    for (variant, &p) in frequencies {
        let Some(&beta) = effect_sizes.get(variant) else {
            continue;
        };
        mean += 2.0 * p * beta;
        variance += 2.0 * p * (1.0 - p) * beta * beta;
        used += 1;
    }

    if used == 0 {
        return Err(ComputeError::NoMatchingVariants);
    }
    if !mean.is_finite() || !variance.is_finite() || variance < 0.0 {
        return Err(ComputeError::NotFinite { mean, variance });
    }
    if variance == 0.0 {
        return Err(ComputeError::Degenerate);
    }

    let std = variance.sqrt();
    Ok(Distribution {
        mean,
        std,
        min: mean - 3.0 * std,
        max: mean + 3.0 * std,
        variants_used: used,
    })
}
