//! polyrisk-pipeline — Per-trait polygenic risk scores.
//!
//! Runs the three-phase pipeline over GWAS-annotated SNPs:
//! - Requirements analysis (ancestry, annotation, trait set, cache keys)
//! - Bulk retrieval of reference stats (one batch lookup, one compute pass)
//! - In-memory PRS, z-score/percentile normalization and trait summaries

pub mod annotator;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod prs;
pub mod summary;

pub use annotator::{compute_dosage, Annotation, AnnotatorError, GenotypeSource, GwasAnnotator, SnpAnnotator};
pub use error::{PipelineError, PipelinePhase, Result};
pub use normalize::{normalize_prs, NormalizeError, NormalizedPrs};
pub use orchestrator::{BulkDataContext, PipelineInput, PipelineOrchestrator, PipelineOutput, PipelineRequirements};
pub use prs::{calculate_prs, PrsResult, SnpContribution};
pub use summary::{RiskBucketSummarizer, RiskLevel, TraitSummarizer, TraitSummary};
