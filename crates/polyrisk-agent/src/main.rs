//! polyrisk — reference statistics operator tool.
//!
//! Loads `polyrisk.toml`, connects to the PostgreSQL store and either checks
//! the configured tables or precomputes reference stats into the cache.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use polyrisk_common::{telemetry, Ancestry, Config, StatsRequest};
use polyrisk_db::schema::cache_table_ddl;
use polyrisk_db::{MemoizedStatsCache, PgRepository, ReferenceStatsCache, Repository, StatsCache, TimedRepository};
use polyrisk_reference::ReferenceService;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing("polyrisk=debug,info");

    let cli = Cli::parse();

    info!("polyrisk {}", env!("CARGO_PKG_VERSION"));
    let config = Config::from_path(&cli.config)
        .with_context(|| format!("could not load {} (copy polyrisk.example.toml and edit it)", cli.config.display()))?;

    let pg = PgRepository::connect(&config.store)?;
    match cli.command {
        Command::InitCache => init_cache(&pg, &config).await,
        Command::Check => check(pg, &config).await,
        Command::Warm { model, traits } => warm(pg, &config, model, traits).await,
    }
}

/// Repository, cache and service wired from configuration.
struct Stack {
    cache: Arc<MemoizedStatsCache<ReferenceStatsCache>>,
    reference: ReferenceService,
}

fn build(pg: PgRepository, config: &Config) -> anyhow::Result<Stack> {
    let repo: Arc<dyn Repository> = Arc::new(TimedRepository::from_secs(pg, config.store.query_timeout_secs));
    let remote = ReferenceStatsCache::new(repo.clone(), &config.cache)?;
    let cache = Arc::new(MemoizedStatsCache::new(remote, config.cache.memory_capacity));
    let reference = ReferenceService::new(repo, cache.clone() as Arc<dyn StatsCache>, &config.reference)?;
    Ok(Stack { cache, reference })
}

async fn init_cache(pg: &PgRepository, config: &Config) -> anyhow::Result<()> {
    let ddl = cache_table_ddl(&config.cache.table);
    pg.execute(&ddl)
        .await
        .with_context(|| format!("failed to create cache table {}", config.cache.table))?;
    info!(table = %config.cache.table, "Cache table ready");
    Ok(())
}

async fn check(pg: PgRepository, config: &Config) -> anyhow::Result<()> {
    let stack = build(pg, config)?;

    if let Err(e) = stack.cache.inner().check().await {
        error!(table = %config.cache.table, error = %e, "Cache table check failed");
        warn!("Run `polyrisk init-cache` to create it:\n{}", cache_table_ddl(&config.cache.table));
        return Err(e.into());
    }
    info!(
        table = %config.cache.table,
        batch_size = stack.cache.inner().batch_size(),
        memo = stack.cache.is_enabled(),
        "Cache table OK"
    );

    stack.reference.check().await?;
    info!(
        model_table = %config.reference.model_table,
        allele_freq_table = %config.reference.allele_freq_table,
        "Reference tables OK"
    );

    let ancestry = Ancestry::from_config(&config.ancestry)?;
    info!(
        ancestry = %ancestry.code(),
        description = %ancestry.description(),
        columns = ?ancestry.column_precedence(),
        "Ancestry resolved"
    );
    Ok(())
}

async fn warm(pg: PgRepository, config: &Config, model_id: Option<String>, traits: Vec<String>) -> anyhow::Result<()> {
    let stack = build(pg, config)?;
    let ancestry = Ancestry::from_config(&config.ancestry)?;
    let model_id = model_id.unwrap_or_else(|| config.pipeline.model_id.clone());

    let requests: Vec<StatsRequest> = traits
        .iter()
        .map(|t| StatsRequest::new(ancestry.code(), t, &model_id))
        .collect();

    let stats = stack.reference.get_reference_stats_batch(&requests).await?;
    for req in &requests {
        match stats.get(&req.cache_key()) {
            Some(s) => info!(
                key = %req.cache_key(),
                mean = s.mean,
                std = s.std,
                min = s.min,
                max = s.max,
                "Reference stats cached"
            ),
            None => warn!(key = %req.cache_key(), "No reference stats produced"),
        }
    }
    info!(requested = requests.len(), available = stats.len(), "Warm complete");
    Ok(())
}
