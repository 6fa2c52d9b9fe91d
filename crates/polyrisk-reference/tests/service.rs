//! ReferenceService against the fixture store.

use std::collections::BTreeMap;
use std::sync::Arc;

use polyrisk_common::{Ancestry, StatsRequest, Variant};
use polyrisk_db::{ReferenceStatsCache, Repository, StatsCache, Value};
use polyrisk_reference::{ReferenceError, ReferenceService};
use polyrisk_test_utils::pretty_assertions::assert_eq;
use polyrisk_test_utils::{
    cache_row, frequency_row, model_row, stats, test_config, FixtureStore, CACHE_TABLE, FREQ_TABLE, MODEL_TABLE,
};

const MODEL: &str = "PGS000001";
const V1: &str = "1:100:A:G";
const V2: &str = "2:200:C:T";
const V3: &str = "3:300:G:A";

fn fixture() -> FixtureStore {
    FixtureStore::new()
        .with_model_rows([
            model_row(MODEL, V1, "G", 0.5, None),
            model_row(MODEL, V2, "T", -0.3, None),
            model_row(MODEL, V3, "A", 0.2, None),
        ])
        .with_frequency_rows([
            frequency_row(V1, &[("AF_nfe", 0.3), ("AF_afr", 0.6)]),
            frequency_row(V2, &[("AF_nfe", 0.1), ("AF_afr", 0.2)]),
            frequency_row(V3, &[("AF_nfe", 0.0), ("AF_afr", 0.4)]),
        ])
}

fn service(store: Arc<FixtureStore>) -> ReferenceService {
    let cfg = test_config("EUR", "");
    let repo: Arc<dyn Repository> = store;
    let cache: Arc<dyn StatsCache> = Arc::new(ReferenceStatsCache::new(repo.clone(), &cfg.cache).unwrap());
    ReferenceService::new(repo, cache, &cfg.reference).unwrap()
}

fn eur() -> Ancestry {
    Ancestry::new("EUR", "").unwrap()
}

// ── LoadModel ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_load_model_decodes_variants() {
    let store = Arc::new(fixture());
    let svc = service(store.clone());

    let model = svc.load_model(MODEL).await.unwrap();
    assert_eq!(model.id, MODEL);
    assert_eq!(model.variants.len(), 3);
    assert_eq!(model.variants[0].chromosome, "1");
    assert_eq!(model.variants[0].position, 100);

    let calls = store.queries_against(MODEL_TABLE);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].sql, "SELECT * FROM prs_models WHERE model_id = ?");
    assert_eq!(calls[0].args, vec![Value::from(MODEL)]);
}

#[tokio::test]
async fn test_load_model_without_rows_is_error() {
    let svc = service(Arc::new(fixture()));
    let err = svc.load_model("PGS999999").await.unwrap_err();
    assert_eq!(err.to_string(), "no variants found for model: PGS999999");
}

#[tokio::test]
async fn test_load_model_rejects_duplicate_variants() {
    let store = FixtureStore::new().with_model_rows([
        model_row(MODEL, V1, "G", 0.5, None),
        model_row(MODEL, V1, "G", 0.4, None),
    ]);
    let err = service(Arc::new(store)).load_model(MODEL).await.unwrap_err();
    assert!(err.to_string().contains("duplicate variant ID: 1:100:A:G"));
}

#[tokio::test]
async fn test_load_model_rejects_zero_weight() {
    let store = FixtureStore::new().with_model_rows([model_row(MODEL, V1, "G", 0.0, None)]);
    let err = service(Arc::new(store)).load_model(MODEL).await.unwrap_err();
    assert!(matches!(err, ReferenceError::RemoteQuery { ref table, .. } if table == MODEL_TABLE));
}

#[tokio::test]
async fn test_load_model_propagates_store_failure() {
    let svc = service(Arc::new(fixture().failing(MODEL_TABLE)));
    let err = svc.load_model(MODEL).await.unwrap_err();
    assert!(err.to_string().contains("query against prs_models failed"));
}

// ── Frequencies ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_shared_variant_is_queried_once_and_fanned_out() {
    let store = Arc::new(fixture());
    let svc = service(store.clone());
    let v1 = Variant::new(V1, "G", 0.5);
    let trait_variants: BTreeMap<String, Vec<Variant>> = ["A", "B", "C"]
        .iter()
        .map(|t| (t.to_string(), vec![v1.clone()]))
        .collect();

    let freqs = svc.get_allele_frequencies_for_traits(&trait_variants, &eur()).await.unwrap();

    let calls = store.queries_against(FREQ_TABLE);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, vec![Value::from("1"), Value::Int(100), Value::from("A"), Value::from("G")]);
    assert_eq!(calls[0].sql.matches("chrom = ?").count(), 1);

    for t in ["A", "B", "C"] {
        assert_eq!(freqs[t].get(V1), Some(&0.3), "trait {t}");
    }
}

#[tokio::test]
async fn test_zero_and_missing_frequencies_are_excluded() {
    let store = Arc::new(fixture());
    let svc = service(store.clone());
    let mut trait_variants = BTreeMap::new();
    trait_variants.insert(
        "height".to_string(),
        vec![
            Variant::new(V1, "G", 0.5),
            Variant::new(V3, "A", 0.2),
            Variant::new("9:999:T:C", "C", 0.1),
        ],
    );

    let freqs = svc.get_allele_frequencies_for_traits(&trait_variants, &eur()).await.unwrap();
    assert_eq!(freqs["height"].keys().collect::<Vec<_>>(), vec![V1]);
}

#[tokio::test]
async fn test_frequency_query_uses_ancestry_precedence() {
    let store = Arc::new(fixture().with_frequency_rows([frequency_row(
        "4:400:C:G",
        &[("AF_nfe_male", 0.0), ("AF_nfe", 0.3), ("AF_male", 0.28)],
    )]));
    let svc = service(store.clone());
    let ancestry = Ancestry::new("EUR", "MALE").unwrap();
    let mut trait_variants = BTreeMap::new();
    trait_variants.insert("t".to_string(), vec![Variant::new("4:400:C:G", "G", 0.1)]);

    let freqs = svc.get_allele_frequencies_for_traits(&trait_variants, &ancestry).await.unwrap();
    assert_eq!(freqs["t"]["4:400:C:G"], 0.3);

    let sql = &store.queries_against(FREQ_TABLE)[0].sql;
    assert!(sql.starts_with(
        "SELECT chrom, pos, ref, alt, AF_nfe_male::float8 AS \"AF_nfe_male\", AF_nfe::float8 AS \"AF_nfe\", \
         AF_male::float8 AS \"AF_male\" FROM"
    ));
}

#[tokio::test]
async fn test_no_variants_means_no_query() {
    let store = Arc::new(fixture());
    let svc = service(store.clone());
    let mut trait_variants = BTreeMap::new();
    trait_variants.insert("height".to_string(), Vec::new());

    let freqs = svc.get_allele_frequencies_for_traits(&trait_variants, &eur()).await.unwrap();
    assert!(freqs["height"].is_empty());
    assert_eq!(store.total_calls(), 0);
}

// ── GetReferenceStats ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_cache_hit_skips_computation() {
    let cached = stats("EUR", "height", MODEL, 1.0, 0.5);
    let store = Arc::new(fixture().with_cache_row(cache_row(&cached)));
    let svc = service(store.clone());

    let got = svc.get_reference_stats(&eur(), "height", MODEL).await.unwrap();
    assert_eq!(got, cached);
    assert!(store.queries_against(MODEL_TABLE).is_empty());
    assert!(store.insert_calls().is_empty());
}

#[tokio::test]
async fn test_cache_miss_computes_and_stores() {
    let store = Arc::new(fixture());
    let svc = service(store.clone());

    let got = svc.get_reference_stats(&eur(), "height", MODEL).await.unwrap();

    // V3 has zero EUR frequency and is excluded.
    let expected_mean = 2.0 * 0.3 * 0.5 + 2.0 * 0.1 * -0.3;
    let expected_var: f64 = 2.0 * 0.3 * 0.7 * 0.25 + 2.0 * 0.1 * 0.9 * 0.09;
    assert!((got.mean - expected_mean).abs() < 1e-12);
    assert!((got.std - expected_var.sqrt()).abs() < 1e-12);
    assert_eq!((got.ancestry.as_str(), got.trait_name.as_str(), got.model.as_str()), ("EUR", "height", MODEL));

    let inserts = store.insert_calls();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].table, CACHE_TABLE);
    assert_eq!(inserts[0].rows, vec![cache_row(&got)]);
}

#[tokio::test]
async fn test_failed_write_back_still_returns_stats() {
    let store = Arc::new(fixture().rejecting_inserts());
    let svc = service(store.clone());

    let got = svc.get_reference_stats(&eur(), "height", MODEL).await.unwrap();
    assert!(got.validate().is_ok());
    assert_eq!(store.insert_calls().len(), 1);
}

#[tokio::test]
async fn test_invalid_cached_row_fails_single_lookup() {
    let mut bad = stats("EUR", "height", MODEL, 1.0, 0.5);
    bad.std = 0.0;
    let svc = service(Arc::new(fixture().with_cache_row(cache_row(&bad))));

    let err = svc.get_reference_stats(&eur(), "height", MODEL).await.unwrap_err();
    assert!(matches!(err, ReferenceError::Cache(_)));
}

// ── Batch ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_requires_single_model() {
    let store = Arc::new(fixture());
    let svc = service(store.clone());
    let reqs = vec![StatsRequest::new("EUR", "height", MODEL), StatsRequest::new("EUR", "bmi", "PGS000002")];

    let err = svc.get_reference_stats_batch(&reqs).await.unwrap_err();
    assert!(err.to_string().contains("all requests must use the same model ID"));
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_batch_mixes_hits_and_computed_misses() {
    let cached = stats("EUR", "height", MODEL, 1.0, 0.5);
    let store = Arc::new(fixture().with_cache_row(cache_row(&cached)));
    let svc = service(store.clone());
    let reqs = vec![
        StatsRequest::new("EUR", "height", MODEL),
        StatsRequest::new("EUR", "bmi", MODEL),
        StatsRequest::new("EUR", "ldl", MODEL),
    ];

    let got = svc.get_reference_stats_batch(&reqs).await.unwrap();

    assert_eq!(got.len(), 3);
    assert_eq!(got["EUR|height|PGS000001"], cached);
    // Both misses share the model, so their stats coincide.
    assert_eq!(got["EUR|bmi|PGS000001"].mean, got["EUR|ldl|PGS000001"].mean);

    // One batch lookup, one model load, one frequency query, one batch store.
    assert_eq!(store.queries_against(CACHE_TABLE).len(), 1);
    assert_eq!(store.queries_against(MODEL_TABLE).len(), 1);
    assert_eq!(store.queries_against(FREQ_TABLE).len(), 1);
    let inserts = store.insert_calls();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].rows.len(), 2);
}

#[tokio::test]
async fn test_compute_batch_groups_by_ancestry() {
    let store = Arc::new(fixture());
    let svc = service(store.clone());
    let reqs = vec![
        StatsRequest::new("EUR", "height", MODEL),
        StatsRequest::new("AFR", "height", MODEL),
        StatsRequest::new("EUR", "bmi", MODEL),
    ];

    let computed = svc.compute_reference_stats_batch(&reqs).await.unwrap();

    assert_eq!(computed.model.as_ref().map(|m| m.id.as_str()), Some(MODEL));
    assert_eq!(computed.stats.len(), 3);
    assert_ne!(computed.stats["EUR|height|PGS000001"].mean, computed.stats["AFR|height|PGS000001"].mean);
    assert_eq!(store.queries_against(MODEL_TABLE).len(), 1);
    assert_eq!(store.queries_against(FREQ_TABLE).len(), 2);
    // Known misses are not looked up again.
    assert!(store.queries_against(CACHE_TABLE).is_empty());
}

#[tokio::test]
async fn test_compute_batch_rejects_unknown_ancestry_code() {
    let svc = service(Arc::new(fixture()));
    let reqs = vec![StatsRequest::new("MARS", "height", MODEL)];
    let err = svc.compute_reference_stats_batch(&reqs).await.unwrap_err();
    assert!(matches!(err, ReferenceError::Core(_)));
}

#[tokio::test]
async fn test_frequency_failure_aborts_batch() {
    let svc = service(Arc::new(fixture().failing(FREQ_TABLE)));
    let reqs = vec![StatsRequest::new("EUR", "height", MODEL)];
    let err = svc.get_reference_stats_batch(&reqs).await.unwrap_err();
    assert!(matches!(err, ReferenceError::RemoteQuery { ref table, .. } if table == FREQ_TABLE));
}

#[tokio::test]
async fn test_per_trait_variants_are_respected() {
    let store = Arc::new(
        FixtureStore::new()
            .with_model_rows([
                model_row(MODEL, V1, "G", 0.5, Some("height")),
                model_row(MODEL, V2, "T", -0.3, Some("bmi")),
            ])
            .with_frequency_rows([frequency_row(V1, &[("AF_nfe", 0.3)]), frequency_row(V2, &[("AF_nfe", 0.1)])]),
    );
    let svc = service(store);

    let got = svc.get_reference_stats(&eur(), "height", MODEL).await.unwrap();
    assert!((got.mean - 2.0 * 0.3 * 0.5).abs() < 1e-12);
}
