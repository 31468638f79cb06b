//! Errors for scoped transaction execution (spec.md §4.9, §7).

use thiserror::Error;

use crate::driver::DriverError;
use crate::error::{driver_error_kind, ErrorKind, OrmError};

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("a transaction scope is already open on this task; nested transactions are not supported")]
    NestedTransaction,

    #[error(transparent)]
    Driver(#[from] DriverError),

    /// An error raised by a transaction-scoped engine operation
    /// (`QueryEngine::*_scoped`), boxed to keep this enum's size down.
    /// Kept distinct from `Driver` so the full `OrmError` classification —
    /// `ConstraintViolation` in particular (spec.md §7, §8 scenario 6) —
    /// survives the trip through `run_in_transaction` instead of
    /// collapsing to a generic transaction failure.
    #[error(transparent)]
    Orm(#[from] Box<OrmError>),
}

impl TransactionError {
    /// Mirrors `OrmError::kind()`'s classification for the two variants
    /// that don't already carry their own `OrmError`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::NestedTransaction => ErrorKind::PlanError,
            TransactionError::Driver(err) => driver_error_kind(err),
            TransactionError::Orm(inner) => inner.kind(),
        }
    }
}
