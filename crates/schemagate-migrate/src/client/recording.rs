//! In-memory client that records statements instead of running them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use schemagate_core::CompiledQuery;

use super::{ClientError, Row, SqlClient, Transaction, TransactionalClient};

#[derive(Debug, Default)]
struct State {
    executed: Vec<CompiledQuery>,
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<String>,
    commits: usize,
    rollbacks: usize,
}

impl State {
    /// Canned rows for the first response whose needle occurs in the SQL.
    fn answer(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError> {
        if self.failures.iter().any(|needle| query.sql.contains(needle.as_str())) {
            return Err(ClientError::Query {
                sql: query.sql.clone(),
                message: "simulated failure".to_string(),
            });
        }
        Ok(self
            .responses
            .iter()
            .find(|(needle, _)| query.sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

/// Records every statement it is asked to run.
///
/// Statements run inside a transaction only show up in
/// [`executed`](Self::executed) once the transaction commits. Clones share
/// the same log.
///
/// ```rust
/// use schemagate_core::CompiledQuery;
/// use schemagate_migrate::client::{RecordingClient, SqlClient};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let client = RecordingClient::new();
/// client
///     .execute_none(&CompiledQuery::unparameterized("SELECT 1"))
///     .await
///     .unwrap();
/// assert_eq!(client.statements(), ["SELECT 1"]);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingClient {
    state: Arc<Mutex<State>>,
}

impl RecordingClient {
    /// An empty recorder that answers every query with no rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers statements containing `needle` with `rows`.
    #[must_use]
    pub fn respond_to(self, needle: impl Into<String>, rows: Vec<Row>) -> Self {
        self.lock().responses.push((needle.into(), rows));
        self
    }

    /// Fails statements containing `needle`.
    #[must_use]
    pub fn fail_on(self, needle: impl Into<String>) -> Self {
        self.lock().failures.push(needle.into());
        self
    }

    /// Statements that ran outside a transaction or in a committed one.
    #[must_use]
    pub fn executed(&self) -> Vec<CompiledQuery> {
        self.lock().executed.clone()
    }

    /// SQL text of [`executed`](Self::executed).
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.lock().executed.iter().map(|q| q.sql.clone()).collect()
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    /// Number of rolled back transactions.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    /// Forgets recorded statements and transaction counts.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.executed.clear();
        state.commits = 0;
        state.rollbacks = 0;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError> {
        let mut state = self.lock();
        let rows = state.answer(query)?;
        state.executed.push(query.clone());
        Ok(rows)
    }
}

fn affected(rows: &[Row]) -> u64 {
    u64::try_from(rows.len()).unwrap_or(u64::MAX)
}

#[async_trait]
impl SqlClient for RecordingClient {
    async fn execute_none(&self, query: &CompiledQuery) -> Result<u64, ClientError> {
        self.run(query).map(|rows| affected(&rows))
    }

    async fn execute_any(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError> {
        self.run(query)
    }
}

#[async_trait]
impl TransactionalClient for RecordingClient {
    async fn begin(&self) -> Result<Box<dyn Transaction>, ClientError> {
        Ok(Box::new(RecordingTransaction {
            client: self.clone(),
            pending: Mutex::new(Some(Vec::new())),
        }))
    }
}

/// Transaction of a [`RecordingClient`]; buffers statements until commit.
#[derive(Debug)]
pub struct RecordingTransaction {
    client: RecordingClient,
    pending: Mutex<Option<Vec<CompiledQuery>>>,
}

impl RecordingTransaction {
    fn run(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError> {
        let rows = self.client.lock().answer(query)?;
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .ok_or(ClientError::Closed)?
            .push(query.clone());
        Ok(rows)
    }

    fn close(&self) -> Result<Vec<CompiledQuery>, ClientError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ClientError::Closed)
    }
}

#[async_trait]
impl SqlClient for RecordingTransaction {
    async fn execute_none(&self, query: &CompiledQuery) -> Result<u64, ClientError> {
        self.run(query).map(|rows| affected(&rows))
    }

    async fn execute_any(&self, query: &CompiledQuery) -> Result<Vec<Row>, ClientError> {
        self.run(query)
    }
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn commit(&mut self) -> Result<(), ClientError> {
        let statements = self.close()?;
        let mut state = self.client.lock();
        state.executed.extend(statements);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ClientError> {
        self.close()?;
        self.client.lock().rollbacks += 1;
        Ok(())
    }

    fn as_client(&self) -> &dyn SqlClient {
        self
    }
}
