//! polyrisk-common — Shared domain types, errors, ancestry resolution and
//! configuration used across all polyrisk crates.

pub mod ancestry;
pub mod config;
pub mod entities;
pub mod error;
pub mod telemetry;
pub mod variant_id;

// Re-export commonly used types
pub use ancestry::Ancestry;
pub use config::{AncestryConfig, CacheConfig, Config, ModelColumns, PipelineConfig, ReferenceConfig, StoreConfig};
pub use entities::{cache_key, AnnotatedSnp, CacheEntry, PrsModel, ReferenceStats, StatsRequest, Variant};
pub use error::{CoreError, Result};
pub use variant_id::{format_variant_id, parse_variant_id, VariantKey};
