//! Configuration loading for polyrisk.
//! Reads polyrisk.toml from the current directory or the path in POLYRISK_CONFIG.
//!
//! The loaded `Config` is passed explicitly into every constructor; nothing
//! reads it from global state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{CoreError, Result};

pub const CONFIG_ENV_VAR: &str = "POLYRISK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "polyrisk.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub reference: ReferenceConfig,
    pub ancestry: AncestryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_max_connections()    -> usize { 4 }
fn default_query_timeout_secs() -> u64 { 60 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_table")]
    pub table: String,
    /// Rows per insert statement. Zero or negative falls back to the default.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    /// Entries held in the in-process memo layer; 0 disables it.
    #[serde(default)]
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            table: default_cache_table(),
            batch_size: default_batch_size(),
            memory_capacity: 0,
        }
    }
}

impl CacheConfig {
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size <= 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size as usize
        }
    }
}

pub const DEFAULT_BATCH_SIZE: usize = 100;

fn default_cache_table() -> String { "reference_stats".to_string() }
fn default_batch_size()  -> i64 { DEFAULT_BATCH_SIZE as i64 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_model_table")]
    pub model_table: String,
    #[serde(default = "default_allele_freq_table")]
    pub allele_freq_table: String,
    #[serde(default)]
    pub columns: ModelColumns,
}

fn default_model_table()       -> String { "prs_models".to_string() }
fn default_allele_freq_table() -> String { "gnomad_allele_frequencies".to_string() }

/// Column names of the PRS model table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelColumns {
    pub model_id: String,
    pub id: String,
    pub effect_weight: String,
    pub effect_allele: String,
    pub other_allele: String,
    pub effect_freq: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub beta_value: String,
    pub beta_ci_lower: String,
    pub beta_ci_upper: String,
    pub odds_ratio: String,
    pub or_ci_lower: String,
    pub or_ci_upper: String,
    pub rsid: String,
}

impl Default for ModelColumns {
    fn default() -> Self {
        Self {
            model_id: "model_id".to_string(),
            id: "variant_id".to_string(),
            effect_weight: "effect_weight".to_string(),
            effect_allele: "effect_allele".to_string(),
            other_allele: "other_allele".to_string(),
            effect_freq: "effect_allele_frequency".to_string(),
            trait_name: "trait".to_string(),
            beta_value: "beta_value".to_string(),
            beta_ci_lower: "beta_ci_lower".to_string(),
            beta_ci_upper: "beta_ci_upper".to_string(),
            odds_ratio: "odds_ratio".to_string(),
            or_ci_lower: "or_ci_lower".to_string(),
            or_ci_upper: "or_ci_upper".to_string(),
            rsid: "rsid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AncestryConfig {
    #[serde(default)]
    pub population: String,
    #[serde(default)]
    pub gender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_gwas_table")]
    pub gwas_table: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            gwas_table: default_gwas_table(),
        }
    }
}

fn default_model_id()   -> String { "PGS000001".to_string() }
fn default_gwas_table() -> String { "gwas_associations".to_string() }

impl Config {
    /// Load configuration from polyrisk.toml.
    /// Checks POLYRISK_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_path(&path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::Config(format!(
                "config file not found: {}. Copy polyrisk.example.toml to polyrisk.toml and edit it.",
                path.display()
            )));
        }

        debug!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ancestry.population.trim().is_empty() {
            return Err(CoreError::MissingAncestryConfig);
        }

        let required = [
            ("store.url", &self.store.url),
            ("cache.table", &self.cache.table),
            ("reference.model_table", &self.reference.model_table),
            ("reference.allele_freq_table", &self.reference.allele_freq_table),
            ("reference.columns.model_id", &self.reference.columns.model_id),
            ("reference.columns.id", &self.reference.columns.id),
            ("reference.columns.effect_weight", &self.reference.columns.effect_weight),
            ("reference.columns.effect_allele", &self.reference.columns.effect_allele),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::Config(format!("{key} must not be empty")));
            }
        }

        if self.store.max_connections == 0 {
            return Err(CoreError::Config("store.max_connections must be at least 1".into()));
        }
        if self.store.query_timeout_secs == 0 {
            return Err(CoreError::Config("store.query_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}

mod tests;
