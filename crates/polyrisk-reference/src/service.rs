//! Reference statistics service.
//!
//! Loads PRS models, fetches allele frequencies in one deduplicated query per
//! ancestry, computes statistics for cache misses and writes them back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use polyrisk_common::{parse_variant_id, Ancestry, CacheEntry, ModelColumns, PrsModel, ReferenceConfig, ReferenceStats, StatsRequest, Variant};
use polyrisk_db::schema::FREQUENCY_KEY_COLUMNS;
use polyrisk_db::sql::{or_of_and_clauses, validate_identifier};
use polyrisk_db::{decode, Repository, StatsCache, StatsMap, Value};

use crate::error::{ReferenceError, Result};
use crate::stats;

/// Trait -> variant ID -> selected allele frequency.
pub type TraitFrequencies = BTreeMap<String, BTreeMap<String, f64>>;

/// Output of [`ReferenceService::compute_reference_stats_batch`].
#[derive(Debug, Clone, Default)]
pub struct ComputedBatch {
    /// The model loaded to compute the stats; `None` when nothing was computed.
    pub model: Option<PrsModel>,
    /// Freshly computed stats keyed by `ancestry|trait|model`.
    pub stats: StatsMap,
}

pub struct ReferenceService {
    repo: Arc<dyn Repository>,
    cache: Arc<dyn StatsCache>,
    model_table: String,
    allele_freq_table: String,
    columns: ModelColumns,
}

impl ReferenceService {
    pub fn new(repo: Arc<dyn Repository>, cache: Arc<dyn StatsCache>, config: &ReferenceConfig) -> Result<Self> {
        for ident in [&config.model_table, &config.allele_freq_table, &config.columns.model_id] {
            validate_identifier(ident).map_err(ReferenceError::remote(ident))?;
        }
        Ok(Self {
            repo,
            cache,
            model_table: config.model_table.clone(),
            allele_freq_table: config.allele_freq_table.clone(),
            columns: config.columns.clone(),
        })
    }

    pub fn cache(&self) -> &Arc<dyn StatsCache> {
        &self.cache
    }

    /// Confirm the model and frequency tables are reachable and shaped as
    /// configured.
    pub async fn check(&self) -> Result<()> {
        let model_columns = [
            self.columns.model_id.as_str(),
            self.columns.id.as_str(),
            self.columns.effect_weight.as_str(),
            self.columns.effect_allele.as_str(),
        ];
        for (table, required) in [
            (&self.model_table, &model_columns[..]),
            (&self.allele_freq_table, &FREQUENCY_KEY_COLUMNS[..]),
        ] {
            self.repo.test_connection(table).await.map_err(ReferenceError::remote(table))?;
            self.repo
                .validate_table(table, required)
                .await
                .map_err(ReferenceError::remote(table))?;
        }
        Ok(())
    }

    // ── Models ──────────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn load_model(&self, model_id: &str) -> Result<PrsModel> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            self.model_table, self.columns.model_id
        );
        let rows = self
            .repo
            .query(&sql, &[Value::from(model_id)])
            .await
            .map_err(ReferenceError::remote(&self.model_table))?;

        if rows.is_empty() {
            return Err(ReferenceError::NoVariants { model_id: model_id.to_string() });
        }

        let variants = rows
            .iter()
            .map(|row| decode::variant(row, &self.columns))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ReferenceError::remote(&self.model_table))?;

        let trait_name = common_trait(&variants);
        let model = PrsModel {
            id: model_id.to_string(),
            trait_name,
            variants,
        };
        model.validate()?;

        info!(model_id, variants = model.variants.len(), "Loaded PRS model");
        Ok(model)
    }

    // ── Allele frequencies ──────────────────────────────────────────────────

    /// Fetch frequencies for every variant referenced by any trait.
    ///
    /// Variant IDs are deduplicated across traits and fetched in a single
    /// query; each result is fanned back out to every trait that referenced
    /// it. Variants with no row, or no positive frequency in any precedence
    /// column, are left out of that trait's map.
    #[instrument(skip(self, trait_variants, ancestry), fields(traits = trait_variants.len(), ancestry = %ancestry))]
    pub async fn get_allele_frequencies_for_traits(
        &self,
        trait_variants: &BTreeMap<String, Vec<Variant>>,
        ancestry: &Ancestry,
    ) -> Result<TraitFrequencies> {
        let mut result: TraitFrequencies = trait_variants
            .keys()
            .map(|t| (t.clone(), BTreeMap::new()))
            .collect();

        let unique: BTreeSet<&str> = trait_variants
            .values()
            .flat_map(|vs| vs.iter().map(|v| v.id.as_str()))
            .collect();
        if unique.is_empty() {
            return Ok(result);
        }

        let mut args = Vec::with_capacity(unique.len() * 4);
        for id in &unique {
            let key = parse_variant_id(id)?;
            args.push(Value::Text(key.chromosome));
            args.push(Value::Int(key.position));
            args.push(Value::Text(key.reference));
            args.push(Value::Text(key.alternate));
        }

        let precedence = ancestry.column_precedence();
        for col in precedence {
            validate_identifier(col).map_err(ReferenceError::remote(&self.allele_freq_table))?;
        }
        // Imported frequency tables often store NUMERIC; read everything as float8.
        let selected: Vec<String> = precedence.iter().map(|c| format!("{c}::float8 AS \"{c}\"")).collect();
        let sql = format!(
            "SELECT {}, {} FROM {} WHERE {}",
            FREQUENCY_KEY_COLUMNS.join(", "),
            selected.join(", "),
            self.allele_freq_table,
            or_of_and_clauses(&FREQUENCY_KEY_COLUMNS, unique.len())
        );

        debug!(variants = unique.len(), columns = precedence.len(), "Querying allele frequencies");
        let rows = self
            .repo
            .query(&sql, &args)
            .await
            .map_err(ReferenceError::remote(&self.allele_freq_table))?;

        let mut selected_freqs: BTreeMap<String, f64> = BTreeMap::new();
        for row in &rows {
            let freq_row = decode::frequency_row(row, precedence)
                .map_err(ReferenceError::remote(&self.allele_freq_table))?;
            let id = freq_row.variant_id();
            match ancestry.select_frequency(&freq_row.frequencies) {
                Ok((freq, column)) => {
                    debug!(variant = %id, column, freq, "Selected frequency");
                    selected_freqs.insert(id, freq);
                }
                Err(e) => debug!(variant = %id, error = %e, "Skipping variant"),
            }
        }

        for (trait_name, variants) in trait_variants {
            let Some(target) = result.get_mut(trait_name) else {
                continue;
            };
            for v in variants {
                if let Some(&freq) = selected_freqs.get(&v.id) {
                    target.insert(v.id.clone(), freq);
                }
            }
        }

        info!(
            requested = unique.len(),
            returned = rows.len(),
            usable = selected_freqs.len(),
            "Retrieved allele frequencies"
        );
        Ok(result)
    }

    // ── Reference stats ─────────────────────────────────────────────────────

    /// Cache first; on a miss compute from the model and write back.
    /// A failed write-back is logged and the computed stats still returned.
    #[instrument(skip(self, ancestry), fields(ancestry = %ancestry))]
    pub async fn get_reference_stats(
        &self,
        ancestry: &Ancestry,
        trait_name: &str,
        model_id: &str,
    ) -> Result<ReferenceStats> {
        let req = StatsRequest::new(ancestry.code(), trait_name, model_id);
        if let Some(hit) = self.cache.get(&req).await.map_err(ReferenceError::Cache)? {
            return Ok(hit);
        }

        let model = self.load_model(model_id).await?;
        let trait_variants = variants_by_trait(&model, [trait_name]);
        let freqs = self.get_allele_frequencies_for_traits(&trait_variants, ancestry).await?;
        let stats = compute_for(&req, &trait_variants, &freqs)?;

        if let Err(e) = self.cache.store(&req, &stats).await {
            warn!(key = %req.cache_key(), error = %e, "Failed to cache computed stats");
        }
        Ok(stats)
    }

    /// Stats for many (ancestry, trait) pairs of one model: one batch cache
    /// lookup, then one compute pass for the misses.
    #[instrument(skip(self, requests), fields(requests = requests.len()))]
    pub async fn get_reference_stats_batch(&self, requests: &[StatsRequest]) -> Result<StatsMap> {
        if requests.is_empty() {
            return Ok(StatsMap::new());
        }
        require_single_model(requests)?;

        let mut found = self.cache.get_batch(requests).await.map_err(ReferenceError::Cache)?;
        let misses: Vec<StatsRequest> = requests
            .iter()
            .filter(|r| !found.contains_key(&r.cache_key()))
            .cloned()
            .collect();

        if !misses.is_empty() {
            let computed = self.compute_reference_stats_batch(&misses).await?;
            found.extend(computed.stats);
        }
        Ok(found)
    }

    /// Compute stats for requests known to be cache misses, without looking
    /// them up again. Loads the model once, issues one frequency query per
    /// distinct ancestry and writes every result back in one batch store.
    #[instrument(skip(self, requests), fields(requests = requests.len()))]
    pub async fn compute_reference_stats_batch(&self, requests: &[StatsRequest]) -> Result<ComputedBatch> {
        if requests.is_empty() {
            return Ok(ComputedBatch::default());
        }
        let model_id = require_single_model(requests)?;

        let mut by_ancestry: BTreeMap<&str, Vec<&StatsRequest>> = BTreeMap::new();
        for req in requests {
            by_ancestry.entry(req.ancestry.as_str()).or_default().push(req);
        }

        let model = self.load_model(model_id).await?;

        let mut entries = Vec::with_capacity(requests.len());
        for (code, group) in &by_ancestry {
            let ancestry = Ancestry::from_code(code)?;
            let trait_variants = variants_by_trait(&model, group.iter().map(|r| r.trait_name.as_str()));
            let freqs = self.get_allele_frequencies_for_traits(&trait_variants, &ancestry).await?;

            for req in group {
                let stats = compute_for(req, &trait_variants, &freqs)?;
                entries.push(CacheEntry { request: (*req).clone(), stats });
            }
        }

        if let Err(e) = self.cache.store_batch(&entries).await {
            warn!(entries = entries.len(), error = %e, "Failed to cache computed stats batch");
        }

        info!(model_id, computed = entries.len(), ancestries = by_ancestry.len(), "Computed reference stats");
        let stats = entries
            .into_iter()
            .map(|e| (e.request.cache_key(), e.stats))
            .collect();
        Ok(ComputedBatch { model: Some(model), stats })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn require_single_model(requests: &[StatsRequest]) -> Result<&str> {
    let expected = requests[0].model_id.as_str();
    match requests.iter().find(|r| r.model_id != expected) {
        Some(other) => Err(ReferenceError::MixedModels {
            expected: expected.to_string(),
            found: other.model_id.clone(),
        }),
        None => Ok(expected),
    }
}

/// The model-level trait when every variant names the same one.
fn common_trait(variants: &[Variant]) -> Option<String> {
    let first = variants.first()?.trait_name.as_ref()?;
    variants
        .iter()
        .all(|v| v.trait_name.as_ref() == Some(first))
        .then(|| first.clone())
}

fn variants_by_trait<'a>(model: &PrsModel, traits: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, Vec<Variant>> {
    traits
        .into_iter()
        .map(|t| (t.to_string(), model.variants_for_trait(t).cloned().collect()))
        .collect()
}

fn compute_for(
    req: &StatsRequest,
    trait_variants: &BTreeMap<String, Vec<Variant>>,
    freqs: &TraitFrequencies,
) -> Result<ReferenceStats> {
    let effects: BTreeMap<String, f64> = trait_variants
        .get(&req.trait_name)
        .map(|vs| vs.iter().map(|v| (v.id.clone(), v.effect_weight)).collect())
        .unwrap_or_default();
    let empty = BTreeMap::new();
    let trait_freqs = freqs.get(&req.trait_name).unwrap_or(&empty);

    let dist = stats::compute(trait_freqs, &effects).map_err(|source| ReferenceError::Compute {
        key: req.cache_key(),
        source,
    })?;
    debug!(key = %req.cache_key(), variants = dist.variants_used, mean = dist.mean, std = dist.std, "Computed distribution");
    Ok(dist.into_stats(&req.ancestry, &req.trait_name, &req.model_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_single_model() {
        let same = vec![StatsRequest::new("EUR", "a", "m1"), StatsRequest::new("AFR", "b", "m1")];
        assert_eq!(require_single_model(&same).unwrap(), "m1");

        let mixed = vec![StatsRequest::new("EUR", "a", "m1"), StatsRequest::new("EUR", "b", "m2")];
        let err = require_single_model(&mixed).unwrap_err();
        assert!(err.to_string().starts_with("all requests must use the same model ID"));
    }

    #[test]
    fn test_common_trait() {
        let mut a = Variant::new("1:1:A:G", "G", 0.1);
        let mut b = Variant::new("1:2:A:G", "G", 0.1);
        assert_eq!(common_trait(&[a.clone(), b.clone()]), None);

        a.trait_name = Some("height".into());
        b.trait_name = Some("height".into());
        assert_eq!(common_trait(&[a.clone(), b.clone()]).as_deref(), Some("height"));

        b.trait_name = Some("bmi".into());
        assert_eq!(common_trait(&[a, b]), None);
    }
}
