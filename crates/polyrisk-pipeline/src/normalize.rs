//! Z-score and percentile of a raw PRS against reference stats.

use serde::Serialize;
use statrs::function::erf::erf;
use thiserror::Error;

use polyrisk_common::ReferenceStats;

use crate::prs::PrsResult;

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("invalid reference stats: std must be nonzero and values must not be NaN (mean {mean}, std {std})")]
    InvalidStats { mean: f64, std: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedPrs {
    pub raw_score: f64,
    pub z_score: f64,
    /// 100·Φ(z).
    pub percentile: f64,
}

pub fn normalize_prs(prs: &PrsResult, stats: &ReferenceStats) -> Result<NormalizedPrs, NormalizeError> {
    if stats.std == 0.0 || stats.mean.is_nan() || stats.std.is_nan() {
        return Err(NormalizeError::InvalidStats { mean: stats.mean, std: stats.std });
    }
    let z_score = (prs.score - stats.mean) / stats.std;
    Ok(NormalizedPrs {
        raw_score: prs.score,
        z_score,
        percentile: 100.0 * normal_cdf(z_score),
    })
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}
