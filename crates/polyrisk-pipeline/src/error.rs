use std::fmt;

use thiserror::Error;

use polyrisk_common::CoreError;
use polyrisk_db::DbError;
use polyrisk_reference::ReferenceError;

use crate::annotator::AnnotatorError;
use crate::normalize::NormalizeError;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// The pipeline's three phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    RequirementsAnalysis,
    BulkRetrieval,
    InMemoryProcessing,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::RequirementsAnalysis => "requirements analysis",
            PipelinePhase::BulkRetrieval => "bulk data retrieval",
            PipelinePhase::InMemoryProcessing => "in-memory processing",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run. Every variant names the phase it aborted in.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{phase}: missing required input: {reason}")]
    Input { phase: PipelinePhase, reason: String },

    #[error("{phase}: ancestry resolution failed: {source}")]
    Ancestry {
        phase: PipelinePhase,
        #[source]
        source: CoreError,
    },

    #[error("{phase}: remote query failed (ancestry {ancestry}, model {model_id}): {source}")]
    RemoteQuery {
        phase: PipelinePhase,
        ancestry: String,
        model_id: String,
        #[source]
        source: ReferenceError,
    },

    /// The store answered, but its model or frequency rows cannot yield
    /// reference stats. Retrying will not help.
    #[error("{phase}: unusable reference data (ancestry {ancestry}, model {model_id}): {source}")]
    ReferenceData {
        phase: PipelinePhase,
        ancestry: String,
        model_id: String,
        #[source]
        source: ReferenceError,
    },

    #[error("{phase}: inconsistent reference stats cache (ancestry {ancestry}, model {model_id}): {source}")]
    CacheConsistency {
        phase: PipelinePhase,
        ancestry: String,
        model_id: String,
        #[source]
        source: DbError,
    },

    #[error("{phase}: no reference stats available for trait {trait_name} (ancestry {ancestry}, model {model_id})")]
    MissingStats {
        phase: PipelinePhase,
        trait_name: String,
        ancestry: String,
        model_id: String,
    },

    #[error("{phase}: SNP annotation failed: {source}")]
    Collaborator {
        phase: PipelinePhase,
        #[source]
        source: AnnotatorError,
    },

    #[error("{phase}: failed to normalize PRS for trait {trait_name}: {source}")]
    Compute {
        phase: PipelinePhase,
        trait_name: String,
        #[source]
        source: NormalizeError,
    },
}

impl PipelineError {
    pub fn phase(&self) -> PipelinePhase {
        match self {
            PipelineError::Input { phase, .. }
            | PipelineError::Ancestry { phase, .. }
            | PipelineError::RemoteQuery { phase, .. }
            | PipelineError::ReferenceData { phase, .. }
            | PipelineError::CacheConsistency { phase, .. }
            | PipelineError::MissingStats { phase, .. }
            | PipelineError::Collaborator { phase, .. }
            | PipelineError::Compute { phase, .. } => *phase,
        }
    }

    /// Classify a reference-layer failure from phase 2. Only store I/O counts
    /// as a remote failure; invalid cached rows, unresolvable ancestry codes
    /// and unusable model or frequency data keep their own category.
    pub(crate) fn from_reference(source: ReferenceError, ancestry: &str, model_id: &str) -> Self {
        let phase = PipelinePhase::BulkRetrieval;
        match source {
            ReferenceError::Cache(db @ (DbError::CacheConsistency { .. } | DbError::DuplicateCacheRows { .. })) => {
                PipelineError::CacheConsistency {
                    phase,
                    ancestry: ancestry.to_string(),
                    model_id: model_id.to_string(),
                    source: db,
                }
            }
            ReferenceError::Core(core @ (CoreError::UnsupportedAncestry { .. } | CoreError::MissingAncestryConfig)) => {
                PipelineError::Ancestry { phase, source: core }
            }
            remote @ (ReferenceError::RemoteQuery { .. } | ReferenceError::Cache(_)) => PipelineError::RemoteQuery {
                phase,
                ancestry: ancestry.to_string(),
                model_id: model_id.to_string(),
                source: remote,
            },
            data @ (ReferenceError::NoVariants { .. }
            | ReferenceError::MixedModels { .. }
            | ReferenceError::Compute { .. }
            | ReferenceError::Core(_)) => PipelineError::ReferenceData {
                phase,
                ancestry: ancestry.to_string(),
                model_id: model_id.to_string(),
                source: data,
            },
        }
    }
}
