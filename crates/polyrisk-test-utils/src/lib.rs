//! Shared testing utilities for the polyrisk workspace.
//!
//! - [`MockRepository`] records every call and answers from scripted handlers.
//! - [`FixtureStore`] answers the cache, model, frequency and GWAS query shapes from
//!   in-memory fixture rows and keeps inserted cache rows.
//! - Row and value builders for those tables.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use polyrisk_common::{
    AncestryConfig, AnnotatedSnp, CacheConfig, Config, ModelColumns, PipelineConfig, ReferenceConfig,
    ReferenceStats, StatsRequest, StoreConfig,
};
use polyrisk_db::{row, DbError, Repository, Result, Row, Value};

pub use pretty_assertions;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

// ── Recorded calls ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertCall {
    pub table: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidateTableCall {
    pub table: String,
    pub required_columns: Vec<String>,
}

#[derive(Debug, Default)]
struct CallLog {
    queries: Vec<QueryCall>,
    inserts: Vec<InsertCall>,
    test_connections: Vec<String>,
    validate_tables: Vec<ValidateTableCall>,
}

impl CallLog {
    fn total(&self) -> usize {
        self.queries.len() + self.inserts.len() + self.test_connections.len() + self.validate_tables.len()
    }
}

// ── MockRepository ──────────────────────────────────────────────────────────

type QueryHandler = Box<dyn Fn(&str, &[Value]) -> Result<Vec<Row>> + Send + Sync>;
type InsertHandler = Box<dyn Fn(&str, &[Row]) -> Result<()> + Send + Sync>;
type TableHandler = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Repository double. Unscripted queries return no rows and unscripted
/// inserts succeed.
#[derive(Default)]
pub struct MockRepository {
    query_handler: Option<QueryHandler>,
    insert_handler: Option<InsertHandler>,
    table_handler: Option<TableHandler>,
    log: Mutex<CallLog>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query returns a copy of `rows`.
    pub fn returning(rows: Vec<Row>) -> Self {
        Self::new().with_query_handler(move |_, _| Ok(rows.clone()))
    }

    pub fn with_query_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        self.query_handler = Some(Box::new(f));
        self
    }

    pub fn with_insert_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[Row]) -> Result<()> + Send + Sync + 'static,
    {
        self.insert_handler = Some(Box::new(f));
        self
    }

    /// Handler for both `test_connection` and `validate_table`.
    pub fn with_table_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.table_handler = Some(Box::new(f));
        self
    }

    pub fn query_calls(&self) -> Vec<QueryCall> {
        lock(&self.log).queries.clone()
    }

    pub fn insert_calls(&self) -> Vec<InsertCall> {
        lock(&self.log).inserts.clone()
    }

    pub fn test_connection_calls(&self) -> Vec<String> {
        lock(&self.log).test_connections.clone()
    }

    pub fn validate_table_calls(&self) -> Vec<ValidateTableCall> {
        lock(&self.log).validate_tables.clone()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.log).total()
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        lock(&self.log).queries.push(QueryCall { sql: sql.to_string(), args: args.to_vec() });
        match &self.query_handler {
            Some(h) => h(sql, args),
            None => Ok(Vec::new()),
        }
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        lock(&self.log).inserts.push(InsertCall { table: table.to_string(), rows: rows.to_vec() });
        match &self.insert_handler {
            Some(h) => h(table, rows),
            None => Ok(()),
        }
    }

    async fn test_connection(&self, table: &str) -> Result<()> {
        lock(&self.log).test_connections.push(table.to_string());
        match &self.table_handler {
            Some(h) => h(table),
            None => Ok(()),
        }
    }

    async fn validate_table(&self, table: &str, required_columns: &[&str]) -> Result<()> {
        lock(&self.log).validate_tables.push(ValidateTableCall {
            table: table.to_string(),
            required_columns: required_columns.iter().map(|c| c.to_string()).collect(),
        });
        match &self.table_handler {
            Some(h) => h(table),
            None => Ok(()),
        }
    }
}

// ── FixtureStore ────────────────────────────────────────────────────────────

pub const CACHE_TABLE: &str = "reference_stats";
pub const MODEL_TABLE: &str = "prs_models";
pub const FREQ_TABLE: &str = "gnomad_allele_frequencies";
pub const GWAS_TABLE: &str = "gwas_associations";

/// In-memory stand-in for the tables the core reads.
///
/// Queries are routed by the table named after `FROM`; `?` arguments are
/// matched against fixture rows in groups (3 for the cache key, 1 for the
/// model ID or rsID, 4 for the variant identity). Cache inserts are kept and become
/// visible to later lookups.
pub struct FixtureStore {
    cache_rows: Mutex<Vec<Row>>,
    model_rows: Vec<Row>,
    frequency_rows: Vec<Row>,
    gwas_rows: Vec<Row>,
    failing_tables: Vec<String>,
    reject_inserts: bool,
    log: Mutex<CallLog>,
}

impl Default for FixtureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureStore {
    pub fn new() -> Self {
        Self {
            cache_rows: Mutex::new(Vec::new()),
            model_rows: Vec::new(),
            frequency_rows: Vec::new(),
            gwas_rows: Vec::new(),
            failing_tables: Vec::new(),
            reject_inserts: false,
            log: Mutex::new(CallLog::default()),
        }
    }

    pub fn with_cache_row(self, row: Row) -> Self {
        lock(&self.cache_rows).push(row);
        self
    }

    pub fn with_model_rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.model_rows.extend(rows);
        self
    }

    pub fn with_frequency_rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.frequency_rows.extend(rows);
        self
    }

    pub fn with_gwas_rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.gwas_rows.extend(rows);
        self
    }

    /// Every query or insert against `table` fails with a backend error.
    pub fn failing(mut self, table: &str) -> Self {
        self.failing_tables.push(table.to_string());
        self
    }

    /// Inserts fail while reads keep working.
    pub fn rejecting_inserts(mut self) -> Self {
        self.reject_inserts = true;
        self
    }

    pub fn cache_rows(&self) -> Vec<Row> {
        lock(&self.cache_rows).clone()
    }

    pub fn query_calls(&self) -> Vec<QueryCall> {
        lock(&self.log).queries.clone()
    }

    /// Queries whose SQL reads from `table`.
    pub fn queries_against(&self, table: &str) -> Vec<QueryCall> {
        self.query_calls()
            .into_iter()
            .filter(|c| reads_from(&c.sql, table))
            .collect()
    }

    pub fn insert_calls(&self) -> Vec<InsertCall> {
        lock(&self.log).inserts.clone()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.log).total()
    }

    fn check_failing(&self, table: &str) -> Result<()> {
        if self.failing_tables.iter().any(|t| t == table) {
            Err(DbError::Backend(format!("fixture table {table} is unavailable")))
        } else {
            Ok(())
        }
    }
}

fn reads_from(sql: &str, table: &str) -> bool {
    sql.contains(&format!("FROM {table} ")) || sql.ends_with(&format!("FROM {table}"))
}

fn loosely_equal(row_value: Option<&Value>, arg: &Value) -> bool {
    match row_value {
        Some(v) => v.to_text() == arg.to_text(),
        None => false,
    }
}

/// Rows matching any of the `columns.len()`-sized argument groups.
fn matching_rows(rows: &[Row], columns: &[&str], args: &[Value]) -> Vec<Row> {
    rows.iter()
        .filter(|row| {
            args.chunks(columns.len()).any(|group| {
                group.len() == columns.len()
                    && columns.iter().zip(group).all(|(col, arg)| loosely_equal(row.get(*col), arg))
            })
        })
        .cloned()
        .collect()
}

#[async_trait]
impl Repository for FixtureStore {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        lock(&self.log).queries.push(QueryCall { sql: sql.to_string(), args: args.to_vec() });

        if reads_from(sql, CACHE_TABLE) {
            self.check_failing(CACHE_TABLE)?;
            let rows = lock(&self.cache_rows);
            Ok(matching_rows(&rows, &["ancestry", "trait", "model"], args))
        } else if reads_from(sql, MODEL_TABLE) {
            self.check_failing(MODEL_TABLE)?;
            Ok(matching_rows(&self.model_rows, &["model_id"], args))
        } else if reads_from(sql, FREQ_TABLE) {
            self.check_failing(FREQ_TABLE)?;
            Ok(matching_rows(&self.frequency_rows, &["chrom", "pos", "ref", "alt"], args))
        } else if reads_from(sql, GWAS_TABLE) {
            self.check_failing(GWAS_TABLE)?;
            Ok(matching_rows(&self.gwas_rows, &["rsid"], args))
        } else {
            Err(DbError::Backend(format!("fixture store cannot answer: {sql}")))
        }
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        lock(&self.log).inserts.push(InsertCall { table: table.to_string(), rows: rows.to_vec() });
        self.check_failing(table)?;
        if self.reject_inserts {
            return Err(DbError::Backend(format!("fixture table {table} is read-only")));
        }
        if table == CACHE_TABLE {
            lock(&self.cache_rows).extend(rows.iter().cloned());
        }
        Ok(())
    }

    async fn test_connection(&self, table: &str) -> Result<()> {
        lock(&self.log).test_connections.push(table.to_string());
        self.check_failing(table)
    }

    async fn validate_table(&self, table: &str, required_columns: &[&str]) -> Result<()> {
        lock(&self.log).validate_tables.push(ValidateTableCall {
            table: table.to_string(),
            required_columns: required_columns.iter().map(|c| c.to_string()).collect(),
        });
        self.check_failing(table)
    }
}

// ── Builders ────────────────────────────────────────────────────────────────

pub fn stats(ancestry: &str, trait_name: &str, model: &str, mean: f64, std: f64) -> ReferenceStats {
    ReferenceStats {
        mean,
        std,
        min: mean - 3.0 * std,
        max: mean + 3.0 * std,
        ancestry: ancestry.to_string(),
        trait_name: trait_name.to_string(),
        model: model.to_string(),
    }
}

pub fn request(ancestry: &str, trait_name: &str, model: &str) -> StatsRequest {
    StatsRequest::new(ancestry, trait_name, model)
}

pub fn cache_row(s: &ReferenceStats) -> Row {
    row! {
        "mean" => s.mean,
        "std" => s.std,
        "min" => s.min,
        "max" => s.max,
        "ancestry" => s.ancestry.as_str(),
        "trait" => s.trait_name.as_str(),
        "model" => s.model.as_str(),
    }
}

/// Model row under the default column mapping. `trait_name` of `None`
/// leaves the trait column null.
pub fn model_row(model_id: &str, variant_id: &str, effect_allele: &str, weight: f64, trait_name: Option<&str>) -> Row {
    row! {
        "model_id" => model_id,
        "variant_id" => variant_id,
        "effect_allele" => effect_allele,
        "effect_weight" => weight,
        "trait" => trait_name,
    }
}

/// Frequency row for a canonical variant ID with the given `AF_*` columns.
pub fn frequency_row(variant_id: &str, frequencies: &[(&str, f64)]) -> Row {
    let parts: Vec<&str> = variant_id.split(':').collect();
    assert_eq!(parts.len(), 4, "fixture variant IDs must be chrom:pos:ref:alt");
    let pos: i64 = parts[1].parse().expect("fixture position must be numeric");

    let mut r = row! {
        "chrom" => parts[0],
        "pos" => pos,
        "ref" => parts[2],
        "alt" => parts[3],
    };
    for (col, f) in frequencies {
        r.insert(col.to_string(), Value::Float(*f));
    }
    r
}

pub fn gwas_row(rsid: &str, risk_allele: &str, beta: f64, trait_name: &str) -> Row {
    row! {
        "rsid" => rsid,
        "risk_allele" => risk_allele,
        "beta" => beta,
        "trait" => trait_name,
    }
}

pub fn snp(rsid: &str, trait_name: &str, dosage: u8, beta: f64) -> AnnotatedSnp {
    AnnotatedSnp {
        rsid: rsid.to_string(),
        genotype: match dosage {
            0 => "AA",
            1 => "AG",
            _ => "GG",
        }
        .to_string(),
        risk_allele: "G".to_string(),
        beta,
        dosage,
        trait_name: trait_name.to_string(),
    }
}

/// Configuration pointing at the fixture table names.
pub fn test_config(population: &str, gender: &str) -> Config {
    Config {
        store: StoreConfig {
            url: "postgres://fixture".to_string(),
            max_connections: 1,
            query_timeout_secs: 5,
        },
        cache: CacheConfig {
            table: CACHE_TABLE.to_string(),
            batch_size: 100,
            memory_capacity: 0,
        },
        reference: ReferenceConfig {
            model_table: MODEL_TABLE.to_string(),
            allele_freq_table: FREQ_TABLE.to_string(),
            columns: ModelColumns::default(),
        },
        ancestry: AncestryConfig {
            population: population.to_string(),
            gender: gender.to_string(),
        },
        pipeline: PipelineConfig {
            gwas_table: GWAS_TABLE.to_string(),
            ..PipelineConfig::default()
        },
    }
}
