//! Polygenic risk score: Σ dosage·β over one trait's SNPs.

use serde::Serialize;

use polyrisk_common::AnnotatedSnp;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnpContribution {
    pub rsid: String,
    pub dosage: u8,
    pub beta: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrsResult {
    pub score: f64,
    pub details: Vec<SnpContribution>,
}

/// Sums in input order; the same SNP list always yields the same score.
pub fn calculate_prs(snps: &[AnnotatedSnp]) -> PrsResult {
    let details: Vec<SnpContribution> = snps
        .iter()
        .map(|snp| SnpContribution {
            rsid: snp.rsid.clone(),
            dosage: snp.dosage,
            beta: snp.beta,
            contribution: f64::from(snp.dosage) * snp.beta,
        })
        .collect();
    let score = details.iter().map(|c| c.contribution).sum();
    PrsResult { score, details }
}
