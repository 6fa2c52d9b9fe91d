//! Three-phase PRS pipeline.
//!
//!   1. Requirements analysis: resolve ancestry, annotate the requested SNPs,
//!      derive the trait set and one cache key per trait
//!   2. Bulk retrieval: one batch cache lookup, one compute pass for the
//!      misses, SNPs grouped by trait
//!   3. In-memory processing: PRS, normalization and summary per trait
//!
//! Each phase completes or the run aborts with an error naming that phase.
//! Nothing from an aborted run is kept.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use polyrisk_common::{Ancestry, AncestryConfig, AnnotatedSnp, Config, PrsModel, ReferenceStats, StatsRequest};
use polyrisk_db::StatsMap;
use polyrisk_reference::{ReferenceError, ReferenceService};

use crate::annotator::SnpAnnotator;
use crate::error::{PipelineError, PipelinePhase, Result};
use crate::normalize::{normalize_prs, NormalizedPrs};
use crate::prs::{calculate_prs, PrsResult};
use crate::summary::{TraitSummarizer, TraitSummary};

// ── Input / output ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub genotype_path: PathBuf,
    pub rsids: Vec<String>,
    /// Overrides the configured model selector.
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub prs: BTreeMap<String, PrsResult>,
    pub normalized: BTreeMap<String, NormalizedPrs>,
    pub summaries: Vec<TraitSummary>,
    pub missing_snps: Vec<String>,
}

// ── Phase outputs ───────────────────────────────────────────────────────────

/// Phase 1 result.
#[derive(Debug, Clone)]
pub struct PipelineRequirements {
    pub traits: BTreeSet<String>,
    pub ancestry: Ancestry,
    pub model_id: String,
    /// One request per trait.
    pub requests: BTreeMap<String, StatsRequest>,
    pub annotated: Vec<AnnotatedSnp>,
    pub missing_snps: Vec<String>,
}

/// Phase 2 result, consumed by phase 3.
#[derive(Debug, Clone, Default)]
pub struct BulkDataContext {
    /// Set only when cache misses forced a model load.
    pub model: Option<PrsModel>,
    pub cached: StatsMap,
    pub computed: StatsMap,
    pub snps_by_trait: BTreeMap<String, Vec<AnnotatedSnp>>,
}

impl BulkDataContext {
    fn stats_for(&self, request: &StatsRequest) -> Option<&ReferenceStats> {
        let key = request.cache_key();
        self.cached.get(&key).or_else(|| self.computed.get(&key))
    }
}

// ── Orchestrator ────────────────────────────────────────────────────────────

pub struct PipelineOrchestrator {
    reference: Arc<ReferenceService>,
    annotator: Arc<dyn SnpAnnotator>,
    summarizer: Arc<dyn TraitSummarizer>,
    ancestry: AncestryConfig,
    default_model_id: String,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &Config,
        reference: Arc<ReferenceService>,
        annotator: Arc<dyn SnpAnnotator>,
        summarizer: Arc<dyn TraitSummarizer>,
    ) -> Self {
        Self {
            reference,
            annotator,
            summarizer,
            ancestry: config.ancestry.clone(),
            default_model_id: config.pipeline.model_id.clone(),
        }
    }

    pub async fn run(&self, input: &PipelineInput) -> Result<PipelineOutput> {
        let requirements = self.analyze_requirements(input).await.map_err(log_abort)?;
        if requirements.traits.is_empty() {
            info!(missing = requirements.missing_snps.len(), "No SNP matched a GWAS association");
            return Ok(PipelineOutput {
                missing_snps: requirements.missing_snps,
                ..PipelineOutput::default()
            });
        }

        let context = self.retrieve_bulk_data(&requirements).await.map_err(log_abort)?;
        let output = self.process_in_memory(requirements, context).map_err(log_abort)?;

        info!(
            traits = output.prs.len(),
            summaries = output.summaries.len(),
            missing = output.missing_snps.len(),
            "Pipeline completed"
        );
        Ok(output)
    }

    // ── Phase 1 ─────────────────────────────────────────────────────────────

    #[instrument(skip(self, input), fields(rsids = input.rsids.len()))]
    pub async fn analyze_requirements(&self, input: &PipelineInput) -> Result<PipelineRequirements> {
        let phase = PipelinePhase::RequirementsAnalysis;

        if input.genotype_path.as_os_str().is_empty() {
            return Err(PipelineError::Input { phase, reason: "genotype file path is empty".into() });
        }
        if input.rsids.is_empty() {
            return Err(PipelineError::Input { phase, reason: "no SNPs requested".into() });
        }

        let ancestry = Ancestry::from_config(&self.ancestry).map_err(|source| PipelineError::Ancestry { phase, source })?;

        let annotation = self
            .annotator
            .annotate(&input.genotype_path, &input.rsids)
            .await
            .map_err(|source| PipelineError::Collaborator { phase, source })?;

        let traits: BTreeSet<String> = annotation
            .annotated
            .iter()
            .filter(|snp| !snp.trait_name.is_empty())
            .map(|snp| snp.trait_name.clone())
            .collect();

        let model_id = input
            .model_id
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model_id.clone());

        let requests = traits
            .iter()
            .map(|t| (t.clone(), StatsRequest::new(ancestry.code(), t, &model_id)))
            .collect();

        info!(
            ancestry = %ancestry.code(),
            model_id = %model_id,
            traits = traits.len(),
            annotated = annotation.annotated.len(),
            "Requirements analysed"
        );
        Ok(PipelineRequirements {
            traits,
            ancestry,
            model_id,
            requests,
            annotated: annotation.annotated,
            missing_snps: annotation.missing,
        })
    }

    // ── Phase 2 ─────────────────────────────────────────────────────────────

    #[instrument(skip(self, req), fields(ancestry = %req.ancestry.code(), model_id = %req.model_id))]
    pub async fn retrieve_bulk_data(&self, req: &PipelineRequirements) -> Result<BulkDataContext> {
        let as_pipeline_err = |e| PipelineError::from_reference(e, req.ancestry.code(), &req.model_id);
        let mut context = BulkDataContext::default();

        if !req.requests.is_empty() {
            let requests: Vec<StatsRequest> = req.requests.values().cloned().collect();
            context.cached = self
                .reference
                .cache()
                .get_batch(&requests)
                .await
                .map_err(|e| as_pipeline_err(ReferenceError::Cache(e)))?;

            let misses: Vec<StatsRequest> = requests
                .into_iter()
                .filter(|r| !context.cached.contains_key(&r.cache_key()))
                .collect();

            if !misses.is_empty() {
                let computed = self
                    .reference
                    .compute_reference_stats_batch(&misses)
                    .await
                    .map_err(as_pipeline_err)?;
                context.model = computed.model;
                context.computed = computed.stats;
            }
        }

        for snp in &req.annotated {
            if req.traits.contains(&snp.trait_name) {
                context.snps_by_trait.entry(snp.trait_name.clone()).or_default().push(snp.clone());
            }
        }

        info!(
            cached = context.cached.len(),
            computed = context.computed.len(),
            traits_with_snps = context.snps_by_trait.len(),
            "Bulk data retrieved"
        );
        Ok(context)
    }

    // ── Phase 3 ─────────────────────────────────────────────────────────────

    /// Pure: no I/O. A trait with SNPs but no stats fails the whole run.
    pub fn process_in_memory(&self, req: PipelineRequirements, context: BulkDataContext) -> Result<PipelineOutput> {
        let phase = PipelinePhase::InMemoryProcessing;
        let mut output = PipelineOutput {
            missing_snps: req.missing_snps,
            ..PipelineOutput::default()
        };

        for trait_name in &req.traits {
            let Some(snps) = context.snps_by_trait.get(trait_name).filter(|s| !s.is_empty()) else {
                warn!(trait_name = %trait_name, "Trait has no matching SNPs, skipping");
                continue;
            };

            let stats = req
                .requests
                .get(trait_name)
                .and_then(|r| context.stats_for(r))
                .ok_or_else(|| PipelineError::MissingStats {
                    phase,
                    trait_name: trait_name.clone(),
                    ancestry: req.ancestry.code().to_string(),
                    model_id: req.model_id.clone(),
                })?;

            let prs = calculate_prs(snps);
            let normalized = normalize_prs(&prs, stats).map_err(|source| PipelineError::Compute {
                phase,
                trait_name: trait_name.clone(),
                source,
            })?;
            output.summaries.push(self.summarizer.summarize(trait_name, snps, &normalized));
            output.prs.insert(trait_name.clone(), prs);
            output.normalized.insert(trait_name.clone(), normalized);
        }
        Ok(output)
    }
}

fn log_abort(e: PipelineError) -> PipelineError {
    error!(phase = %e.phase(), error = %e, "Pipeline aborted");
    e
}
