//! The SQL client the runner, history store and introspection talk to.
//!
//! [`SqlClient`] is the whole surface: run a compiled statement and get back
//! nothing, any number of rows, or exactly one row. [`TransactionalClient`]
//! adds transactions, which the runner opens once per migration.
//!
//! Two implementations ship with the crate: [`PgClient`] on a `sqlx`
//! Postgres pool, and [`RecordingClient`], which keeps every statement in
//! memory and backs dry runs and tests.

mod postgres;
mod recording;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemagate_core::{CompiledQuery, SqlValue, ToSqlValue};

pub use postgres::{PgClient, PgTransaction};
pub use recording::{RecordingClient, RecordingTransaction};

/// Errors raised by a [`SqlClient`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The database is unreachable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected a statement.
    #[error("Query failed: {message}\n  SQL: {sql}")]
    Query {
        /// Statement text.
        sql: String,
        /// Database message.
        message: String,
    },

    /// `execute_one` saw zero or several rows.
    #[error("Expected exactly one row from '{sql}', got {count}")]
    UnexpectedRowCount {
        /// Statement text.
        sql: String,
        /// Rows returned.
        count: usize,
    },

    /// A column could not be read as the requested type.
    #[error("Cannot decode column '{column}': {message}")]
    Decode {
        /// Column name.
        column: String,
        /// What went wrong.
        message: String,
    },

    /// The transaction was already committed or rolled back.
    #[error("Transaction is already closed")]
    Closed,
}

/// One result row, columns in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// An empty row.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.columns.push((name.into(), value.to_sql_value()));
        self
    }

    /// Columns in order.
    #[must_use]
    pub fn columns(&self) -> &[(String, SqlValue)] {
        &self.columns
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    fn require(&self, name: &str) -> Result<&SqlValue, ClientError> {
        self.get(name).ok_or_else(|| ClientError::Decode {
            column: name.to_string(),
            message: "column is missing from the row".to_string(),
        })
    }

    /// Reads a text column.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the column is missing or not text.
    pub fn text(&self, name: &str) -> Result<&str, ClientError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| mismatch(name, "text", value))
    }

    /// Reads a text column that may be NULL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the column is missing or neither
    /// text nor NULL.
    pub fn optional_text(&self, name: &str) -> Result<Option<&str>, ClientError> {
        let value = self.require(name)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_str()
            .map(Some)
            .ok_or_else(|| mismatch(name, "text", value))
    }

    /// Reads a JSON column.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the column is missing or not JSON.
    pub fn json(&self, name: &str) -> Result<&serde_json::Value, ClientError> {
        let value = self.require(name)?;
        value.as_json().ok_or_else(|| mismatch(name, "json", value))
    }

    /// Reads a boolean column.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the column is missing or not a boolean.
    pub fn bool(&self, name: &str) -> Result<bool, ClientError> {
        let value = self.require(name)?;
        value.as_bool().ok_or_else(|| mismatch(name, "bool", value))
    }

    /// Reads a timestamp column.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the column is missing or not a timestamp.
    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, ClientError> {
        let value = self.require(name)?;
        value
            .as_timestamp()
            .ok_or_else(|| mismatch(name, "timestamp", value))
    }
}

fn mismatch(column: &str, expected: &str, found: &SqlValue) -> ClientError {
    ClientError::Decode {
        column: column.to_string(),
        message: format!("expected {expected}, found {}", found.kind()),
    }
}

/// Runs compiled statements.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Runs a statement and returns the number of affected rows.
    async fn execute_none(&self, query: &CompiledQuery) -> Result<u64, ClientError>;

    /// Runs a statement and returns all rows.
    async fn execute_any(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError>;

    /// Runs a statement that must return exactly one row.
    async fn execute_one(&self, query: &CompiledQuery) -> Result<Row, ClientError> {
        let mut rows = self.execute_any(query).await?;
        let count = rows.len();
        match rows.pop() {
            Some(row) if count == 1 => Ok(row),
            _ => Err(ClientError::UnexpectedRowCount {
                sql: query.sql.clone(),
                count,
            }),
        }
    }
}

/// An open transaction. Statements run through it are only visible to
/// others once [`commit`](Transaction::commit) succeeds.
#[async_trait]
pub trait Transaction: SqlClient {
    /// Commits the transaction.
    async fn commit(&mut self) -> Result<(), ClientError>;

    /// Rolls the transaction back.
    async fn rollback(&mut self) -> Result<(), ClientError>;

    /// The transaction as a plain client, for migration bodies.
    fn as_client(&self) -> &dyn SqlClient;
}

/// A client that can open transactions.
#[async_trait]
pub trait TransactionalClient: SqlClient {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row() -> Row {
        Row::new()
            .with("name", "001_init")
            .with("finished", true)
            .with("started", Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_typed_getters() {
        let row = row();
        assert_eq!(row.text("name").unwrap(), "001_init");
        assert!(row.bool("finished").unwrap());
        assert_eq!(
            row.timestamp("started").unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
        );
        assert_eq!(row.columns().len(), 3);
    }

    #[test]
    fn test_getter_errors_name_the_column() {
        let row = row();
        let err = row.bool("name").unwrap_err();
        assert_eq!(
            err,
            ClientError::Decode {
                column: "name".into(),
                message: "expected bool, found text".into(),
            }
        );
        assert!(row.text("missing").unwrap_err().to_string().contains("missing"));
    }

    #[test]
    fn test_optional_and_json_getters() {
        let row = Row::new()
            .with("predicate", None::<&str>)
            .with("definition", "CREATE INDEX")
            .with("columns", serde_json::json!(["a", "b"]));
        assert_eq!(row.optional_text("predicate").unwrap(), None);
        assert_eq!(row.optional_text("definition").unwrap(), Some("CREATE INDEX"));
        assert_eq!(row.json("columns").unwrap(), &serde_json::json!(["a", "b"]));
        assert!(row.optional_text("columns").is_err());
        assert!(row.json("definition").is_err());
    }

    #[tokio::test]
    async fn test_execute_one_rejects_other_counts() {
        let client = RecordingClient::new()
            .respond_to("two", vec![Row::new(), Row::new()])
            .respond_to("one", vec![row()]);

        let one = client
            .execute_one(&CompiledQuery::unparameterized("SELECT one"))
            .await
            .unwrap();
        assert_eq!(one.text("name").unwrap(), "001_init");

        let err = client
            .execute_one(&CompiledQuery::unparameterized("SELECT two"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedRowCount { count: 2, .. }));

        let err = client
            .execute_one(&CompiledQuery::unparameterized("SELECT nothing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedRowCount { count: 0, .. }));
    }
}
