//! Reference statistics cache.
//!
//! The cache is a table in the remote store keyed by (ancestry, trait, model).
//! This module is the only place that issues SQL against that table; callers
//! deal in [`StatsRequest`], [`ReferenceStats`] and [`CacheEntry`] values.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use polyrisk_common::{CacheConfig, CacheEntry, ReferenceStats, StatsRequest};

use crate::decode;
use crate::error::{DbError, Result};
use crate::repository::Repository;
use crate::schema::{CACHE_COLUMNS, COL_ANCESTRY, COL_MODEL, COL_TRAIT};
use crate::sql::{or_of_and_clauses, validate_identifier};
use crate::value::{Row, Value};

/// Batch lookup results keyed by `ancestry|trait|model`.
pub type StatsMap = HashMap<String, ReferenceStats>;

#[async_trait]
pub trait StatsCache: Send + Sync {
    /// `Ok(None)` on a miss. An invalid cached row is an error.
    async fn get(&self, req: &StatsRequest) -> Result<Option<ReferenceStats>>;

    /// One round trip for any number of requests. Invalid rows are dropped.
    async fn get_batch(&self, reqs: &[StatsRequest]) -> Result<StatsMap>;

    async fn store(&self, req: &StatsRequest, stats: &ReferenceStats) -> Result<()>;

    /// Writes in fixed-size chunks; each chunk is atomic, chunks are not.
    async fn store_batch(&self, entries: &[CacheEntry]) -> Result<()>;
}

/// Repository-backed [`StatsCache`].
#[derive(Clone)]
pub struct ReferenceStatsCache {
    repo: Arc<dyn Repository>,
    table: String,
    batch_size: usize,
}

impl ReferenceStatsCache {
    pub fn new(repo: Arc<dyn Repository>, config: &CacheConfig) -> Result<Self> {
        validate_identifier(&config.table)?;
        Ok(Self {
            repo,
            table: config.table.clone(),
            batch_size: config.effective_batch_size(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Confirm the cache table is reachable and has the expected columns.
    pub async fn check(&self) -> Result<()> {
        self.repo.test_connection(&self.table).await?;
        self.repo.validate_table(&self.table, &CACHE_COLUMNS).await
    }

    fn select_sql(&self, where_clause: &str, limit: Option<usize>) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            CACHE_COLUMNS.join(", "),
            self.table,
            where_clause
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        sql
    }

    fn key_args(req: &StatsRequest) -> [Value; 3] {
        [
            Value::from(&req.ancestry),
            Value::from(&req.trait_name),
            Value::from(&req.model_id),
        ]
    }

    fn to_row(req: &StatsRequest, stats: &ReferenceStats) -> Row {
        decode::reference_stats_row(&req.ancestry, &req.trait_name, &req.model_id, stats)
    }

    fn validate_stats(req: &StatsRequest, stats: &ReferenceStats) -> Result<()> {
        stats
            .validate()
            .map_err(|e| DbError::InvalidStats(format!("{}: {e}", req.cache_key())))
    }
}

#[async_trait]
impl StatsCache for ReferenceStatsCache {
    #[instrument(skip(self), fields(key = %req.cache_key()))]
    async fn get(&self, req: &StatsRequest) -> Result<Option<ReferenceStats>> {
        let clause = or_of_and_clauses(&[COL_ANCESTRY, COL_TRAIT, COL_MODEL], 1);
        // LIMIT 2 so a duplicated key is detected instead of silently picking one.
        let sql = self.select_sql(&clause, Some(2));
        let rows = self.repo.query(&sql, &Self::key_args(req)).await?;

        match rows.as_slice() {
            [] => {
                debug!("Cache miss");
                Ok(None)
            }
            [row] => {
                let stats = decode::reference_stats(row).map_err(|e| DbError::CacheConsistency {
                    key: req.cache_key(),
                    reason: e.to_string(),
                })?;
                stats.validate().map_err(|e| DbError::CacheConsistency {
                    key: req.cache_key(),
                    reason: e.to_string(),
                })?;
                debug!("Cache hit");
                Ok(Some(stats))
            }
            _ => Err(DbError::DuplicateCacheRows {
                key: req.cache_key(),
                count: rows.len(),
            }),
        }
    }

    #[instrument(skip(self, reqs), fields(requests = reqs.len()))]
    async fn get_batch(&self, reqs: &[StatsRequest]) -> Result<StatsMap> {
        if reqs.is_empty() {
            return Ok(StatsMap::new());
        }

        let clause = or_of_and_clauses(&[COL_ANCESTRY, COL_TRAIT, COL_MODEL], reqs.len());
        let sql = self.select_sql(&clause, None);
        let args: Vec<Value> = reqs.iter().flat_map(Self::key_args).collect();

        let rows = self.repo.query(&sql, &args).await?;

        let mut found = StatsMap::with_capacity(rows.len());
        for row in &rows {
            let stats = match decode::reference_stats(row) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable cache row");
                    continue;
                }
            };
            if let Err(e) = stats.validate() {
                warn!(key = %stats.request().cache_key(), error = %e, "Dropping invalid cache row");
                continue;
            }
            found.insert(stats.request().cache_key(), stats);
        }

        debug!(hits = found.len(), misses = reqs.len().saturating_sub(found.len()), "Batch cache lookup");
        Ok(found)
    }

    #[instrument(skip(self, stats), fields(key = %req.cache_key()))]
    async fn store(&self, req: &StatsRequest, stats: &ReferenceStats) -> Result<()> {
        Self::validate_stats(req, stats)?;
        self.repo.insert(&self.table, &[Self::to_row(req, stats)]).await?;
        debug!("Stored reference stats");
        Ok(())
    }

    #[instrument(skip(self, entries), fields(entries = entries.len(), batch_size = self.batch_size))]
    async fn store_batch(&self, entries: &[CacheEntry]) -> Result<()> {
        for entry in entries {
            Self::validate_stats(&entry.request, &entry.stats)?;
        }

        for (i, chunk) in entries.chunks(self.batch_size).enumerate() {
            let start = i * self.batch_size;
            let end = start + chunk.len();
            let rows: Vec<Row> = chunk.iter().map(|e| Self::to_row(&e.request, &e.stats)).collect();

            self.repo
                .insert(&self.table, &rows)
                .await
                .map_err(|e| DbError::BatchStore {
                    start,
                    end: end - 1,
                    source: Box::new(e),
                })?;
            debug!(start, end, "Stored cache chunk");
        }
        Ok(())
    }
}
