//! The full pipeline against the fixture store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polyrisk_common::Config;
use polyrisk_db::{ReferenceStatsCache, Repository, StatsCache};
use polyrisk_pipeline::{
    AnnotatorError, GenotypeSource, GwasAnnotator, PipelineError, PipelineInput, PipelineOrchestrator, PipelinePhase,
    RiskBucketSummarizer, RiskLevel,
};
use polyrisk_reference::ReferenceService;
use polyrisk_test_utils::pretty_assertions::assert_eq;
use polyrisk_test_utils::{
    cache_row, frequency_row, gwas_row, model_row, stats, test_config, FixtureStore, CACHE_TABLE, FREQ_TABLE,
    GWAS_TABLE, MODEL_TABLE,
};

const MODEL: &str = "PGS000001";

struct Calls(BTreeMap<String, String>);

impl GenotypeSource for Calls {
    fn read(&self, _path: &Path, rsids: &[String]) -> Result<BTreeMap<String, String>, AnnotatorError> {
        Ok(rsids
            .iter()
            .filter_map(|r| self.0.get(r).map(|g| (r.clone(), g.clone())))
            .collect())
    }
}

fn genotypes() -> Calls {
    Calls(
        [("rs1", "AG"), ("rs2", "GG"), ("rs3", "AA"), ("rs4", "TT"), ("rs5", "CC")]
            .iter()
            .map(|(r, g)| (r.to_string(), g.to_string()))
            .collect(),
    )
}

/// Height is carried by rs1..rs3 and model variants 1 and 2; LDL by rs4 and
/// variant 3. rs5 has an association without a trait.
fn fixture() -> FixtureStore {
    FixtureStore::new()
        .with_gwas_rows([
            gwas_row("rs1", "G", 0.5, "height"),
            gwas_row("rs2", "G", 0.3, "height"),
            gwas_row("rs3", "G", 0.2, "height"),
            gwas_row("rs4", "T", 0.1, "ldl"),
            gwas_row("rs5", "C", 0.4, ""),
        ])
        .with_model_rows([
            model_row(MODEL, "1:100:A:G", "G", 0.5, Some("height")),
            model_row(MODEL, "2:200:C:T", "T", -0.3, Some("height")),
            model_row(MODEL, "3:300:G:A", "A", 0.2, Some("ldl")),
        ])
        .with_frequency_rows([
            frequency_row("1:100:A:G", &[("AF_nfe", 0.3)]),
            frequency_row("2:200:C:T", &[("AF_nfe", 0.1)]),
            frequency_row("3:300:G:A", &[("AF_nfe", 0.4)]),
        ])
}

fn with_cached_stats(store: FixtureStore) -> FixtureStore {
    store
        .with_cache_row(cache_row(&stats("EUR", "height", MODEL, 0.1, 0.25)))
        .with_cache_row(cache_row(&stats("EUR", "ldl", MODEL, 0.0, 0.5)))
}

fn orchestrator_with(store: Arc<FixtureStore>, config: &Config) -> PipelineOrchestrator {
    let repo: Arc<dyn Repository> = store;
    let cache: Arc<dyn StatsCache> = Arc::new(ReferenceStatsCache::new(repo.clone(), &config.cache).unwrap());
    let reference = Arc::new(ReferenceService::new(repo.clone(), cache, &config.reference).unwrap());
    let annotator = GwasAnnotator::new(repo, &config.pipeline.gwas_table, genotypes()).unwrap();
    PipelineOrchestrator::new(config, reference, Arc::new(annotator), Arc::new(RiskBucketSummarizer))
}

fn orchestrator(store: Arc<FixtureStore>) -> PipelineOrchestrator {
    orchestrator_with(store, &test_config("EUR", ""))
}

fn input(rsids: &[&str]) -> PipelineInput {
    PipelineInput {
        genotype_path: PathBuf::from("sample_genotypes.txt"),
        rsids: rsids.iter().map(|s| s.to_string()).collect(),
        model_id: None,
    }
}

#[tokio::test]
async fn test_cached_run_scores_every_trait() {
    let store = Arc::new(with_cached_stats(fixture()));
    let out = orchestrator(store.clone())
        .run(&input(&["rs1", "rs2", "rs3", "rs4", "rs9"]))
        .await
        .unwrap();

    assert!((out.prs["height"].score - 1.1).abs() < 1e-9);
    assert!((out.normalized["height"].z_score - 4.0).abs() < 1e-9);
    assert!((out.prs["ldl"].score - 0.2).abs() < 1e-12);
    assert!((out.normalized["ldl"].z_score - 0.4).abs() < 1e-12);
    assert_eq!(out.missing_snps, vec!["rs9".to_string()]);

    let height = out.summaries.iter().find(|s| s.trait_name == "height").unwrap();
    assert_eq!(height.risk_level, RiskLevel::High);
    assert_eq!(height.num_risk_alleles, 3);

    assert_eq!(store.queries_against(GWAS_TABLE).len(), 1);
    assert_eq!(store.queries_against(CACHE_TABLE).len(), 1);
    assert_eq!(store.queries_against(MODEL_TABLE).len(), 0);
    assert_eq!(store.queries_against(FREQ_TABLE).len(), 0);
    assert!(store.insert_calls().is_empty());
}

#[tokio::test]
async fn test_cache_misses_are_computed_in_one_pass_and_stored() {
    let store = Arc::new(fixture());
    let orch = orchestrator(store.clone());

    let out = orch.run(&input(&["rs1", "rs2", "rs4"])).await.unwrap();
    assert_eq!(out.normalized.len(), 2);

    assert_eq!(store.queries_against(CACHE_TABLE).len(), 1);
    assert_eq!(store.queries_against(MODEL_TABLE).len(), 1);
    assert_eq!(store.queries_against(FREQ_TABLE).len(), 1);
    let inserts = store.insert_calls();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].table, CACHE_TABLE);
    assert_eq!(inserts[0].rows.len(), 2);

    // The second run is served from the stats written by the first.
    let again = orch.run(&input(&["rs1", "rs2", "rs4"])).await.unwrap();
    assert_eq!(again, out);
    assert_eq!(store.queries_against(MODEL_TABLE).len(), 1);
    assert_eq!(store.insert_calls().len(), 1);
}

#[tokio::test]
async fn test_invalid_cached_row_is_recomputed() {
    let mut bad = stats("EUR", "height", MODEL, 0.1, 0.25);
    bad.std = -1.0;
    let store = Arc::new(fixture().with_cache_row(cache_row(&bad)));

    let out = orchestrator(store.clone()).run(&input(&["rs1"])).await.unwrap();

    assert!(out.normalized.contains_key("height"));
    assert_eq!(store.queries_against(MODEL_TABLE).len(), 1);
}

#[tokio::test]
async fn test_empty_snp_list_fails_before_any_remote_call() {
    let store = Arc::new(fixture());
    let err = orchestrator(store.clone()).run(&input(&[])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Input { .. }));
    assert_eq!(err.phase(), PipelinePhase::RequirementsAnalysis);
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_empty_genotype_path_is_input_error() {
    let store = Arc::new(fixture());
    let mut req = input(&["rs1"]);
    req.genotype_path = PathBuf::new();

    let err = orchestrator(store.clone()).run(&req).await.unwrap_err();
    assert!(matches!(err, PipelineError::Input { .. }));
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_unsupported_ancestry_fails_phase_one() {
    let store = Arc::new(fixture());
    let err = orchestrator_with(store.clone(), &test_config("MARS", ""))
        .run(&input(&["rs1"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Ancestry { phase: PipelinePhase::RequirementsAnalysis, .. }));
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_no_matching_trait_is_an_empty_result() {
    let store = Arc::new(fixture());
    let out = orchestrator(store.clone()).run(&input(&["rs5", "rs9"])).await.unwrap();

    assert!(out.prs.is_empty());
    assert!(out.normalized.is_empty());
    assert!(out.summaries.is_empty());
    assert_eq!(out.missing_snps, vec!["rs9".to_string()]);
    assert_eq!(store.queries_against(CACHE_TABLE).len(), 0);
}

#[tokio::test]
async fn test_frequency_failure_aborts_phase_two() {
    let store = Arc::new(fixture().failing(FREQ_TABLE));
    let err = orchestrator(store.clone()).run(&input(&["rs1", "rs4"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::RemoteQuery { .. }));
    assert_eq!(err.phase(), PipelinePhase::BulkRetrieval);
    assert!(err.to_string().contains("ancestry EUR"));
    assert!(store.insert_calls().is_empty());
}

#[tokio::test]
async fn test_unknown_model_names_the_model() {
    let store = Arc::new(fixture());
    let mut req = input(&["rs1"]);
    req.model_id = Some("PGS999999".into());

    let err = orchestrator(store).run(&req).await.unwrap_err();
    assert!(matches!(err, PipelineError::ReferenceData { .. }));
    assert!(err.to_string().contains("model PGS999999"));
}

#[tokio::test]
async fn test_trait_without_model_variants_is_a_data_error() {
    let store = Arc::new(fixture().with_gwas_rows([gwas_row("rs5", "C", 0.4, "bmi")]));
    let err = orchestrator(store.clone()).run(&input(&["rs1", "rs5"])).await.unwrap_err();

    assert!(matches!(err, PipelineError::ReferenceData { .. }), "{err}");
    assert_eq!(err.phase(), PipelinePhase::BulkRetrieval);
    let msg = err.to_string();
    assert!(msg.contains("EUR|bmi|PGS000001"));
    assert!(!msg.contains("remote query failed"));
    assert!(store.insert_calls().is_empty());
}

#[tokio::test]
async fn test_repeated_association_counts_once() {
    let store = Arc::new(with_cached_stats(fixture()).with_gwas_rows([gwas_row("rs1", "G", 0.5, "height")]));
    let out = orchestrator(store).run(&input(&["rs1"])).await.unwrap();

    assert!((out.prs["height"].score - 0.5).abs() < 1e-12);
    assert_eq!(out.prs["height"].details.len(), 1);
    let height = out.summaries.iter().find(|s| s.trait_name == "height").unwrap();
    assert_eq!(height.num_risk_alleles, 1);
}
