//! Driver contract (spec.md §6 "External interfaces").
//!
//! The engine depends only on these traits; a concrete backend (the
//! `deadpool-postgres`/`tokio-postgres` pairing `pgorm` uses, per
//! `DESIGN.md`) is an external collaborator supplied by the application,
//! not a dependency of the compilation engine itself (spec.md §1 "out of
//! scope: the connection/pool driver abstraction").

use async_trait::async_trait;
use tokio_postgres::types::ToSql;

use crate::value::DriverValue;

/// One row of a query result, as columns the materializer can look up by
/// the alias path the emitter assigned (spec.md §3 "shape-stable
/// decoding").
#[derive(Debug, Clone, Default)]
pub struct QueryRow {
    columns: Vec<(String, DriverValue)>,
}

impl QueryRow {
    pub fn new(columns: Vec<(String, DriverValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, alias: &str) -> Option<&DriverValue> {
        self.columns.iter().find(|(name, _)| name == alias).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<QueryRow>,
    pub row_count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("driver rejected statement: {0}")]
    Execution(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("driver does not support multi-statement execution")]
    MultiStatementUnsupported,

    #[error("execution was cancelled")]
    Cancelled,
}

/// A single borrowed connection. Never shared concurrently (spec.md §5
/// "shared-resource policy") — each scope or query execution owns one
/// for its duration.
#[async_trait]
pub trait Connection: Send {
    async fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<QueryResult, DriverError>;

    /// Simple-protocol path for drivers that can return multiple result
    /// sets from one multi-statement command (spec.md §6, used by the
    /// temp-table strategy when `supports_multi_statement()` is true).
    async fn query_simple_multi(&mut self, _sql: &str) -> Result<Vec<QueryResult>, DriverError> {
        Err(DriverError::MultiStatementUnsupported)
    }

    /// Opens a transaction bound to this connection. The returned handle
    /// borrows the connection for its lifetime (spec.md §4.9).
    async fn transaction(&mut self) -> Result<Box<dyn TransactionHandle + '_>, DriverError>;

    async fn release(self: Box<Self>);
}

/// A transaction-bound handle: every `query` call through it runs on the
/// same underlying connection and transaction (spec.md §4.9).
#[async_trait]
pub trait TransactionHandle: Send {
    async fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<QueryResult, DriverError>;

    async fn commit(self: Box<Self>) -> Result<(), DriverError>;
    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}

/// The pool/driver abstraction itself (spec.md §6).
#[async_trait]
pub trait Driver: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Connection>, DriverError>;

    fn supports_multi_statement(&self) -> bool;
    fn supports_binary_protocol(&self) -> bool;
}
