//! Shared test fixtures for the `integration`/`e2e` suites: an in-memory
//! `Driver`/`Connection`/`TransactionHandle` that hands back a scripted
//! sequence of `QueryResult`s instead of talking to real PostgreSQL.
//!
//! Not a `mockall::mock!` of `Driver` itself — `Driver`/`Connection` are
//! `#[async_trait]` trait objects, and hand-writing the fake is the more
//! direct path here; `mockall` earns its keep instead on the plain
//! synchronous `ValueMapper` seam (see `tests/unit/mapper_mock.rs`).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use relorm::driver::{Connection, Driver, DriverError, QueryResult, TransactionHandle};
use tokio_postgres::types::ToSql;

#[derive(Default)]
struct FakeState {
    responses: VecDeque<Result<QueryResult, DriverError>>,
    executed: Vec<String>,
    committed: bool,
    rolled_back: bool,
}

/// Hands out connections that all share one response queue and one
/// executed-statement log, so a test can script "first the temp-table
/// CREATE returns Ok, then the SELECT returns these rows" in order.
#[derive(Clone)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
    multi_statement: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            multi_statement: false,
        }
    }

    pub fn with_multi_statement(mut self) -> Self {
        self.multi_statement = true;
        self
    }

    /// Queues the next `query()` call's return value, in call order.
    pub fn push_ok(&self, result: QueryResult) -> &Self {
        self.state.lock().unwrap().responses.push_back(Ok(result));
        self
    }

    pub fn push_err(&self, err: DriverError) -> &Self {
        self.state.lock().unwrap().responses.push_back(Err(err));
        self
    }

    pub fn executed_statements(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn committed(&self) -> bool {
        self.state.lock().unwrap().committed
    }

    pub fn rolled_back(&self) -> bool {
        self.state.lock().unwrap().rolled_back
    }
}

pub struct FakeConnection {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn query(&mut self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> Result<QueryResult, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        state.responses.pop_front().unwrap_or_else(|| Ok(QueryResult::default()))
    }

    async fn transaction(&mut self) -> Result<Box<dyn TransactionHandle + '_>, DriverError> {
        Ok(Box::new(FakeTransactionHandle {
            state: self.state.clone(),
        }))
    }

    async fn release(self: Box<Self>) {}
}

struct FakeTransactionHandle {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl TransactionHandle for FakeTransactionHandle {
    async fn query(&mut self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> Result<QueryResult, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        state.responses.pop_front().unwrap_or_else(|| Ok(QueryResult::default()))
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.state.lock().unwrap().committed = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.state.lock().unwrap().rolled_back = true;
        Ok(())
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn acquire(&self) -> Result<Box<dyn Connection>, DriverError> {
        Ok(Box::new(FakeConnection {
            state: self.state.clone(),
        }))
    }

    fn supports_multi_statement(&self) -> bool {
        self.multi_statement
    }

    fn supports_binary_protocol(&self) -> bool {
        true
    }
}
