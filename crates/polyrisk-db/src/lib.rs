//! Polyrisk Database Layer
//!
//! This crate owns the repository boundary, the only I/O seam of the
//! reference-statistics core, and the reference-stats cache built on it.
//!
//! # Features
//!
//! - `Repository` trait with portable `?`-placeholder SQL
//! - PostgreSQL backend over a `deadpool-postgres` pool
//! - Deadline decorator for any repository
//! - Composite-key stats cache with single-round-trip batch lookups
//! - Optional in-process LRU memo layer
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use polyrisk_common::Config;
//! use polyrisk_db::{PgRepository, ReferenceStatsCache, Repository, StatsCache, TimedRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let pg = PgRepository::connect(&config.store)?;
//!     let repo: Arc<dyn Repository> =
//!         Arc::new(TimedRepository::from_secs(pg, config.store.query_timeout_secs));
//!
//!     let cache = ReferenceStatsCache::new(repo, &config.cache)?;
//!     cache.check().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod decode;
pub mod error;
pub mod memo;
pub mod postgres;
pub mod repository;
pub mod schema;
pub mod sql;
pub mod value;

pub use cache::{ReferenceStatsCache, StatsCache, StatsMap};
pub use decode::{FrequencyRow, GwasAssociation};
pub use error::{DbError, Result};
pub use memo::MemoizedStatsCache;
pub use postgres::PgRepository;
pub use repository::{Repository, TimedRepository};
pub use value::{Row, Value};
