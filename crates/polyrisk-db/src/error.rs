//! Database error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("failed to decode {entity} row: {reason}")]
    Decode { entity: &'static str, reason: String },

    #[error("invalid cached stats for {key}: {reason}")]
    CacheConsistency { key: String, reason: String },

    #[error("found {count} cache rows for {key}, expected at most one")]
    DuplicateCacheRows { key: String, count: usize },

    #[error("invalid stats: {0}")]
    InvalidStats(String),

    #[error("failed to store batch {start}-{end}: {source}")]
    BatchStore {
        start: usize,
        end: usize,
        #[source]
        source: Box<DbError>,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("table {table}: {reason}")]
    Table { table: String, reason: String },

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DbError::Pool(err.to_string())
    }
}

impl From<deadpool_postgres::CreatePoolError> for DbError {
    fn from(err: deadpool_postgres::CreatePoolError) -> Self {
        DbError::Pool(err.to_string())
    }
}
