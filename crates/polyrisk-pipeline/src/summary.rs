//! Per-trait summaries.

use std::fmt;

use serde::Serialize;

use polyrisk_common::AnnotatedSnp;

use crate::normalize::NormalizedPrs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Below the 20th percentile is low, from the 80th up is high.
    pub fn from_percentile(percentile: f64) -> Self {
        if percentile < 20.0 {
            RiskLevel::Low
        } else if percentile >= 80.0 {
            RiskLevel::High
        } else {
            RiskLevel::Moderate
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitSummary {
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub risk_level: RiskLevel,
    pub num_risk_alleles: u32,
    pub effect_weighted_contribution: f64,
}

/// Turns one trait's SNPs and normalized score into a summary.
pub trait TraitSummarizer: Send + Sync {
    fn summarize(&self, trait_name: &str, snps: &[AnnotatedSnp], normalized: &NormalizedPrs) -> TraitSummary;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RiskBucketSummarizer;

impl TraitSummarizer for RiskBucketSummarizer {
    fn summarize(&self, trait_name: &str, snps: &[AnnotatedSnp], normalized: &NormalizedPrs) -> TraitSummary {
        TraitSummary {
            trait_name: trait_name.to_string(),
            risk_level: RiskLevel::from_percentile(normalized.percentile),
            num_risk_alleles: snps.iter().map(|s| u32::from(s.dosage)).sum(),
            effect_weighted_contribution: snps.iter().map(|s| f64::from(s.dosage) * s.beta).sum(),
        }
    }
}
