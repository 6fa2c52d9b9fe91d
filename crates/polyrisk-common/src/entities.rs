//! Core domain types shared by the cache, the reference service and the
//! pipeline. Everything here is decoded from store rows at the repository
//! boundary; no business logic sees raw rows.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// PRS model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Canonical `chrom:pos:ref:alt`.
    pub id: String,
    pub chromosome: String,
    pub position: i64,
    pub effect_allele: String,
    pub other_allele: String,
    pub effect_weight: f64,
    pub effect_freq: Option<f64>,
    pub beta_value: Option<f64>,
    pub beta_ci_lower: Option<f64>,
    pub beta_ci_upper: Option<f64>,
    pub odds_ratio: Option<f64>,
    pub or_ci_lower: Option<f64>,
    pub or_ci_upper: Option<f64>,
    pub rsid: Option<String>,
    /// Trait the variant was published for. `None` means it applies to every
    /// trait scored with the model.
    #[serde(rename = "trait")]
    pub trait_name: Option<String>,
}

impl Variant {
    pub fn new(id: impl Into<String>, effect_allele: impl Into<String>, effect_weight: f64) -> Self {
        Self {
            id: id.into(),
            chromosome: String::new(),
            position: 0,
            effect_allele: effect_allele.into(),
            other_allele: String::new(),
            effect_weight,
            effect_freq: None,
            beta_value: None,
            beta_ci_lower: None,
            beta_ci_upper: None,
            odds_ratio: None,
            or_ci_lower: None,
            or_ci_upper: None,
            rsid: None,
            trait_name: None,
        }
    }

    pub fn applies_to(&self, trait_name: &str) -> bool {
        self.trait_name.as_deref().map_or(true, |t| t == trait_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrsModel {
    pub id: String,
    #[serde(rename = "trait")]
    pub trait_name: Option<String>,
    pub variants: Vec<Variant>,
}

impl PrsModel {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(CoreError::InvalidModel("model ID is required".into()));
        }
        if self.variants.is_empty() {
            return Err(CoreError::InvalidModel(format!("model {} has no variants", self.id)));
        }

        let mut seen = HashSet::with_capacity(self.variants.len());
        for v in &self.variants {
            if v.id.is_empty() {
                return Err(CoreError::InvalidModel("variant ID is required".into()));
            }
            if !seen.insert(v.id.as_str()) {
                return Err(CoreError::InvalidModel(format!("duplicate variant ID: {}", v.id)));
            }
        }
        Ok(())
    }

    /// Variant ID -> effect weight, in variant-ID order.
    pub fn effect_sizes(&self) -> BTreeMap<String, f64> {
        self.variants
            .iter()
            .map(|v| (v.id.clone(), v.effect_weight))
            .collect()
    }

    pub fn variants_for_trait<'a>(&'a self, trait_name: &'a str) -> impl Iterator<Item = &'a Variant> + 'a {
        self.variants.iter().filter(move |v| v.applies_to(trait_name))
    }
}

// ---------------------------------------------------------------------------
// Reference statistics
// ---------------------------------------------------------------------------

/// Population PRS distribution for one (ancestry, trait, model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub ancestry: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub model: String,
}

impl ReferenceStats {
    /// Requires `std > 0` and `min <= mean <= max`. NaN fails every comparison
    /// and is rejected with it.
    pub fn validate(&self) -> Result<()> {
        if !(self.std > 0.0) {
            return Err(CoreError::InvalidStats(format!(
                "standard deviation must be positive, got {}",
                self.std
            )));
        }
        if !(self.min <= self.max) {
            return Err(CoreError::InvalidStats(format!(
                "min ({}) must not exceed max ({})",
                self.min, self.max
            )));
        }
        if !(self.min <= self.mean && self.mean <= self.max) {
            return Err(CoreError::InvalidStats(format!(
                "mean ({}) must lie within [{}, {}]",
                self.mean, self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn request(&self) -> StatsRequest {
        StatsRequest::new(&self.ancestry, &self.trait_name, &self.model)
    }
}

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatsRequest {
    pub ancestry: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub model_id: String,
}

impl StatsRequest {
    pub fn new(ancestry: impl Into<String>, trait_name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            ancestry: ancestry.into(),
            trait_name: trait_name.into(),
            model_id: model_id.into(),
        }
    }

    /// `ancestry|trait|model`, the key of batch lookup results.
    pub fn cache_key(&self) -> String {
        cache_key(&self.ancestry, &self.trait_name, &self.model_id)
    }
}

pub fn cache_key(ancestry: &str, trait_name: &str, model_id: &str) -> String {
    format!("{ancestry}|{trait_name}|{model_id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub request: StatsRequest,
    pub stats: ReferenceStats,
}

// ---------------------------------------------------------------------------
// Annotated SNPs
// ---------------------------------------------------------------------------

/// A genotyped SNP joined with its GWAS association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSnp {
    pub rsid: String,
    pub genotype: String,
    pub risk_allele: String,
    pub beta: f64,
    /// Copies of the risk allele (0, 1 or 2).
    pub dosage: u8,
    #[serde(rename = "trait")]
    pub trait_name: String,
}
