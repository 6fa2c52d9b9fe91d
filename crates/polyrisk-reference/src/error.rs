use thiserror::Error;

use polyrisk_common::CoreError;
use polyrisk_db::DbError;

use crate::stats::ComputeError;

pub type Result<T> = std::result::Result<T, ReferenceError>;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference stats cache: {0}")]
    Cache(#[source] DbError),

    #[error("query against {table} failed: {source}")]
    RemoteQuery {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("no variants found for model: {model_id}")]
    NoVariants { model_id: String },

    #[error("all requests must use the same model ID (expected {expected}, found {found})")]
    MixedModels { expected: String, found: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to compute reference stats for {key}: {source}")]
    Compute {
        key: String,
        #[source]
        source: ComputeError,
    },
}

impl ReferenceError {
    pub(crate) fn remote(table: &str) -> impl FnOnce(DbError) -> Self + '_ {
        move |source| ReferenceError::RemoteQuery {
            table: table.to_string(),
            source,
        }
    }
}
