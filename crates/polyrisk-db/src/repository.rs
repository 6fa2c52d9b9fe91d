//! The repository boundary: the only I/O seam of the core.
//!
//! SQL passed to [`Repository::query`] uses portable `?` placeholders; each
//! backend translates them to its own syntax.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DbError, Result};
use crate::value::{Row, Value};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Run a query and return its rows in server order.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// Insert rows into `table`. All rows of one call commit or fail together.
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()>;

    /// Cheap round trip proving the table is reachable.
    async fn test_connection(&self, table: &str) -> Result<()>;

    /// Fail unless `table` has every column in `required_columns`.
    async fn validate_table(&self, table: &str, required_columns: &[&str]) -> Result<()>;
}

#[async_trait]
impl<R: Repository + ?Sized> Repository for Arc<R> {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, args).await
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        (**self).insert(table, rows).await
    }

    async fn test_connection(&self, table: &str) -> Result<()> {
        (**self).test_connection(table).await
    }

    async fn validate_table(&self, table: &str, required_columns: &[&str]) -> Result<()> {
        (**self).validate_table(table, required_columns).await
    }
}

// ── Deadlines ───────────────────────────────────────────────────────────────

/// Bounds every call on the wrapped repository with a deadline. An expired
/// call surfaces as [`DbError::Timeout`]; the in-flight future is dropped.
#[derive(Clone)]
pub struct TimedRepository<R> {
    inner: R,
    timeout: Duration,
}

impl<R: Repository> TimedRepository<R> {
    pub fn new(inner: R, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn from_secs(inner: R, secs: u64) -> Self {
        Self::new(inner, Duration::from_secs(secs))
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout_secs = self.timeout.as_secs(), "Repository call timed out");
                Err(DbError::Timeout {
                    operation: operation.to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl<R: Repository> Repository for TimedRepository<R> {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.bounded("query", self.inner.query(sql, args)).await
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        self.bounded("insert", self.inner.insert(table, rows)).await
    }

    async fn test_connection(&self, table: &str) -> Result<()> {
        self.bounded("test_connection", self.inner.test_connection(table)).await
    }

    async fn validate_table(&self, table: &str, required_columns: &[&str]) -> Result<()> {
        self.bounded("validate_table", self.inner.validate_table(table, required_columns))
            .await
    }
}
