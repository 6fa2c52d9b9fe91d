#[cfg(test)]
mod tests {
    use super::super::*;

    const MINIMAL: &str = r#"
        [store]
        url = "postgres://polyrisk@localhost/reference"

        [reference]

        [ancestry]
        population = "EUR"
    "#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let cfg = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.store.max_connections, 4);
        assert_eq!(cfg.store.query_timeout_secs, 60);
        assert_eq!(cfg.cache.table, "reference_stats");
        assert_eq!(cfg.cache.effective_batch_size(), 100);
        assert_eq!(cfg.cache.memory_capacity, 0);
        assert_eq!(cfg.reference.columns.model_id, "model_id");
        assert_eq!(cfg.ancestry.gender, "");
        assert_eq!(cfg.pipeline.model_id, "PGS000001");
    }

    #[test]
    fn test_missing_population_rejected() {
        let toml = r#"
            [store]
            url = "postgres://localhost/ref"
            [reference]
            [ancestry]
            gender = "MALE"
        "#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, CoreError::MissingAncestryConfig));
    }

    #[test]
    fn test_non_positive_batch_size_falls_back() {
        let mut cache = CacheConfig::default();
        cache.batch_size = 0;
        assert_eq!(cache.effective_batch_size(), DEFAULT_BATCH_SIZE);
        cache.batch_size = -5;
        assert_eq!(cache.effective_batch_size(), DEFAULT_BATCH_SIZE);
        cache.batch_size = 2;
        assert_eq!(cache.effective_batch_size(), 2);
    }

    #[test]
    fn test_column_overrides() {
        let toml = r#"
            [store]
            url = "postgres://localhost/ref"

            [reference]
            model_table = "pgs_scoring"

            [reference.columns]
            model_id = "pgs_id"
            trait = "reported_trait"

            [ancestry]
            population = "AFR"
            gender = "FEMALE"
        "#;
        let cfg = Config::from_toml_str(toml).unwrap();
        assert_eq!(cfg.reference.model_table, "pgs_scoring");
        assert_eq!(cfg.reference.columns.model_id, "pgs_id");
        assert_eq!(cfg.reference.columns.trait_name, "reported_trait");
        assert_eq!(cfg.reference.columns.effect_weight, "effect_weight");
    }

    #[test]
    fn test_empty_table_name_rejected() {
        let toml = r#"
            [store]
            url = "postgres://localhost/ref"
            [cache]
            table = ""
            [reference]
            [ancestry]
            population = "EUR"
        "#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("cache.table"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_path("/nonexistent/polyrisk.toml").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
