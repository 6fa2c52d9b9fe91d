//! PostgreSQL implementation of [`Repository`].
//!
//! Connections come from a `deadpool-postgres` pool sized from `[store]`.
//! Arguments are bound as [`Value`]s, which convert themselves to whatever
//! parameter type the server inferred for each placeholder.

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use polyrisk_common::StoreConfig;

use crate::error::{DbError, Result};
use crate::repository::Repository;
use crate::sql::{rewrite_placeholders, validate_identifier};
use crate::value::{Row, Value};

static NULL: Value = Value::Null;

/// PostgreSQL-backed repository.
#[derive(Clone)]
pub struct PgRepository {
    pool: Pool,
}

impl PgRepository {
    /// Build the pool. No connection is opened until the first call.
    pub fn connect(store: &StoreConfig) -> Result<Self> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(store.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(store.max_connections));

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        info!(max_connections = store.max_connections, "Postgres pool created");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run a statement that returns no rows (DDL, maintenance).
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.pool.get().await?;
        Ok(client.execute(sql, &[]).await?)
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let statement = rewrite_placeholders(sql);
        let params: Vec<&(dyn ToSql + Sync)> = args.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await?;
        // Batched lookups produce a new statement text per request shape, so
        // these are not kept in the per-connection statement cache.
        let prepared = client.prepare(&statement).await?;
        let rows = client.query(&prepared, &params).await?;

        debug!(params = args.len(), rows = rows.len(), "Query complete");
        rows.iter().map(convert_row).collect()
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        validate_identifier(table)?;

        let columns: Vec<&str> = rows
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for col in &columns {
            validate_identifier(col)?;
        }

        let mut groups = Vec::with_capacity(rows.len());
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            let mut slots = Vec::with_capacity(columns.len());
            for col in &columns {
                params.push(row.get(*col).unwrap_or(&NULL));
                slots.push(format!("${}", params.len()));
            }
            groups.push(format!("({})", slots.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {table} ({}) VALUES {}",
            columns.join(", "),
            groups.join(", ")
        );

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute(sql.as_str(), &params).await?;
        tx.commit().await?;

        debug!(table, rows = rows.len(), "Insert committed");
        Ok(())
    }

    async fn test_connection(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        let client = self.pool.get().await?;
        client
            .query(format!("SELECT 1 FROM {table} LIMIT 1").as_str(), &[])
            .await
            .map_err(|e| DbError::Table {
                table: table.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn validate_table(&self, table: &str, required_columns: &[&str]) -> Result<()> {
        validate_identifier(table)?;
        let (schema, name) = match table.rsplit_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, table),
        };

        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_name = $1 AND ($2::text IS NULL OR table_schema = $2)",
                &[&name, &schema],
            )
            .await?;

        if rows.is_empty() {
            return Err(DbError::Table {
                table: table.to_string(),
                reason: "table does not exist".into(),
            });
        }

        let existing: BTreeSet<String> = rows
            .iter()
            .map(|r| r.try_get::<_, String>(0).map(|c| c.to_ascii_lowercase()))
            .collect::<std::result::Result<_, _>>()?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|c| !existing.contains(&c.to_ascii_lowercase()))
            .collect();

        if !missing.is_empty() {
            return Err(DbError::Table {
                table: table.to_string(),
                reason: format!("missing required columns: {}", missing.join(", ")),
            });
        }
        Ok(())
    }
}

// ── Row conversion ──────────────────────────────────────────────────────────

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

/// Decodes the column types the repository exposes. `NUMERIC` has no lossless
/// `f64` mapping and is rejected; queries cast such columns to `float8`.
fn convert_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::new();
    for (idx, col) in row.columns().iter().enumerate() {
        let ty = col.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool)
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v.into()))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v.into()))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.map(Value::Int)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float(v.into()))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.map(Value::Float)
        } else if is_text(ty) {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        } else {
            return Err(DbError::Decode {
                entity: "postgres",
                reason: format!("unsupported type {} for column {}", ty, col.name()),
            });
        };
        out.insert(col.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

// ── Parameter binding ───────────────────────────────────────────────────────

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*i as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else if is_text(ty) {
                    i.to_string().to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            Value::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else if is_text(ty) {
                    f.to_string().to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Value::Text(s) => {
                if *ty == Type::INT8 {
                    s.trim().parse::<i64>()?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    s.trim().parse::<i32>()?.to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    s.trim().parse::<f64>()?.to_sql(ty, out)
                } else {
                    s.as_str().to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
