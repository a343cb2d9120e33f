//! [`SqlClient`] on a `sqlx` Postgres pool.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemagate_core::{CompiledQuery, NullKind, SqlValue};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query as SqlxQuery;
use sqlx::{Column, Postgres, Row as _, TypeInfo};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{ClientError, Row, SqlClient, Transaction, TransactionalClient};

/// Postgres client backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgClient {
    pool: PgPool,
    slow_query: Option<Duration>,
}

impl PgClient {
    /// Connects a pool of at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] if the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, ClientError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|err| ClientError::Connection(err.to_string()))?;
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            slow_query: None,
        }
    }

    /// Logs a warning for statements slower than `threshold`.
    #[must_use]
    pub fn slow_query_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_query = threshold;
        self
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SqlClient for PgClient {
    async fn execute_none(&self, query: &CompiledQuery) -> Result<u64, ClientError> {
        let started = Instant::now();
        let result = prepare(query).execute(&self.pool).await;
        report(query, started, self.slow_query);
        Ok(result.map_err(|err| map_error(&query.sql, &err))?.rows_affected())
    }

    async fn execute_any(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError> {
        let started = Instant::now();
        let result = prepare(query).fetch_all(&self.pool).await;
        report(query, started, self.slow_query);
        let rows = result.map_err(|err| map_error(&query.sql, &err))?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl TransactionalClient for PgClient {
    async fn begin(&self) -> Result<Box<dyn Transaction>, ClientError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| map_error("BEGIN", &err))?;
        Ok(Box::new(PgTransaction {
            tx: Mutex::new(Some(tx)),
            slow_query: self.slow_query,
        }))
    }
}

/// An open Postgres transaction.
pub struct PgTransaction {
    tx: Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
    slow_query: Option<Duration>,
}

#[async_trait]
impl SqlClient for PgTransaction {
    async fn execute_none(&self, query: &CompiledQuery) -> Result<u64, ClientError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(ClientError::Closed)?;
        let started = Instant::now();
        let result = prepare(query).execute(&mut **tx).await;
        report(query, started, self.slow_query);
        Ok(result.map_err(|err| map_error(&query.sql, &err))?.rows_affected())
    }

    async fn execute_any(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(ClientError::Closed)?;
        let started = Instant::now();
        let result = prepare(query).fetch_all(&mut **tx).await;
        report(query, started, self.slow_query);
        let rows = result.map_err(|err| map_error(&query.sql, &err))?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(&mut self) -> Result<(), ClientError> {
        let tx = self.tx.get_mut().take().ok_or(ClientError::Closed)?;
        tx.commit().await.map_err(|err| map_error("COMMIT", &err))
    }

    async fn rollback(&mut self) -> Result<(), ClientError> {
        let tx = self.tx.get_mut().take().ok_or(ClientError::Closed)?;
        tx.rollback().await.map_err(|err| map_error("ROLLBACK", &err))
    }

    fn as_client(&self) -> &dyn SqlClient {
        self
    }
}

// ===== Statement plumbing =====

fn prepare(query: &CompiledQuery) -> SqlxQuery<'_, Postgres, PgArguments> {
    debug!(sql = %query.sql, args = query.args.len(), "Executing SQL");
    query
        .args
        .iter()
        .fold(sqlx::query(&query.sql), |prepared, arg| bind(prepared, arg))
}

fn bind<'q>(
    prepared: SqlxQuery<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> SqlxQuery<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null(kind) => match kind {
            NullKind::Bool => prepared.bind(None::<bool>),
            NullKind::Int => prepared.bind(None::<i64>),
            NullKind::Float => prepared.bind(None::<f64>),
            NullKind::Text => prepared.bind(None::<String>),
            NullKind::Bytes => prepared.bind(None::<Vec<u8>>),
            NullKind::Timestamp => prepared.bind(None::<DateTime<Utc>>),
            NullKind::Json => prepared.bind(None::<serde_json::Value>),
        },
        SqlValue::Bool(b) => prepared.bind(*b),
        SqlValue::Int(n) => prepared.bind(*n),
        SqlValue::Float(f) => prepared.bind(*f),
        SqlValue::Text(s) => prepared.bind(s.clone()),
        SqlValue::Bytes(bytes) => prepared.bind(bytes.clone()),
        SqlValue::Timestamp(ts) => prepared.bind(*ts),
        SqlValue::Json(json) => prepared.bind(json.clone()),
    }
}

fn report(query: &CompiledQuery, started: Instant, threshold: Option<Duration>) {
    let elapsed = started.elapsed();
    if threshold.is_some_and(|limit| elapsed >= limit) {
        warn!(
            sql = %query.sql,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Slow query"
        );
    }
}

fn map_error(sql: &str, err: &sqlx::Error) -> ClientError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => ClientError::Connection(err.to_string()),
        sqlx::Error::ColumnDecode { index, source } => ClientError::Decode {
            column: index.clone(),
            message: source.to_string(),
        },
        _ => ClientError::Query {
            sql: sql.to_string(),
            message: err.to_string(),
        },
    }
}

// ===== Row decoding =====

fn decode_row(row: &PgRow) -> Result<Row, ClientError> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let name = column.name();
        let value = decode_column(row, column.ordinal(), column.type_info().name())
            .map_err(|err| ClientError::Decode {
                column: name.to_string(),
                message: err.to_string(),
            })?;
        decoded = decoded.with(name, value);
    }
    Ok(decoded)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<SqlValue, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(SqlValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|n| SqlValue::Int(i64::from(n))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|n| SqlValue::Int(i64::from(n))),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(SqlValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|f| SqlValue::Float(f64::from(f))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(SqlValue::Float),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(SqlValue::Timestamp),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(SqlValue::Json),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index)?.map(SqlValue::Bytes),
        _ => row.try_get::<Option<String>, _>(index)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or_else(|| SqlValue::Null(null_kind(type_name))))
}

/// Parameter type a NULL read from a column of `type_name` binds back as.
fn null_kind(type_name: &str) -> NullKind {
    match type_name {
        "BOOL" => NullKind::Bool,
        "INT2" | "INT4" | "INT8" => NullKind::Int,
        "FLOAT4" | "FLOAT8" => NullKind::Float,
        "TIMESTAMPTZ" => NullKind::Timestamp,
        "JSON" | "JSONB" => NullKind::Json,
        "BYTEA" => NullKind::Bytes,
        _ => NullKind::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_kind_follows_column_type() {
        assert_eq!(null_kind("FLOAT8"), NullKind::Float);
        assert_eq!(null_kind("INT4"), NullKind::Int);
        assert_eq!(null_kind("TIMESTAMPTZ"), NullKind::Timestamp);
        assert_eq!(null_kind("VARCHAR"), NullKind::Text);
    }
}
