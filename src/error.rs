//! Crate-wide error type.
//!
//! Each component owns its own `thiserror` enum (see `expr::errors`,
//! `schema::errors`, `builder::errors`, `planner::errors`,
//! `strategy::errors`, `cte::errors`, `emit::errors`,
//! `materialize::errors`, `txn::errors`) and this enum wraps them with
//! `#[from]`, the same shape `query_planner::analyzer::errors::AnalyzerError`
//! uses to wrap `PlanCtxError`/`GraphSchemaError` with `#[source]`.
//!
//! This also carries the error-kind taxonomy of spec.md §7
//! (`ConfigurationError`, `InvalidCondition`, `PlanError`, `DriverError`,
//! `ConstraintViolation`, `CancellationError`) as a classification method,
//! since several component-level errors map to the same caller-facing kind.

use thiserror::Error;

use crate::builder::errors::PlanError;
use crate::config::ConfigError;
use crate::cte::errors::CteError;
use crate::emit::errors::EmitError;
use crate::expr::errors::ExpressionError;
use crate::materialize::errors::MaterializeError;
use crate::driver::DriverError;
use crate::planner::errors::JoinPlanError;
use crate::schema::errors::SchemaError;
use crate::strategy::errors::StrategyError;
use crate::txn::errors::TransactionError;

/// The kind taxonomy from spec.md §7. Not a type hierarchy of its own —
/// a projection used by callers who want to branch on category without
/// matching every leaf error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    InvalidCondition,
    PlanError,
    DriverError,
    ConstraintViolation,
    CancellationError,
}

#[derive(Debug, Error)]
pub enum OrmError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    JoinPlan(#[from] JoinPlanError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Cte(#[from] CteError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("execution was cancelled")]
    Cancellation,
}

impl From<DriverError> for OrmError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::ConstraintViolation(msg) => OrmError::ConstraintViolation(msg),
            DriverError::Cancelled => OrmError::Cancellation,
            DriverError::Execution(_) | DriverError::MultiStatementUnsupported => {
                OrmError::Driver(err.to_string())
            }
        }
    }
}

/// The `ErrorKind` a raw `DriverError` classifies as, shared between
/// `From<DriverError> for OrmError` above and
/// `TransactionError::kind()` (`src/txn/errors.rs`) — the latter sees
/// `DriverError`s that never pass through the `From` impl above, since
/// `TransactionScope::query` surfaces them directly.
pub(crate) fn driver_error_kind(err: &DriverError) -> ErrorKind {
    match err {
        DriverError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
        DriverError::Cancelled => ErrorKind::CancellationError,
        DriverError::Execution(_) | DriverError::MultiStatementUnsupported => ErrorKind::DriverError,
    }
}

impl OrmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrmError::Configuration(_) | OrmError::Schema(_) => ErrorKind::ConfigurationError,
            OrmError::Expression(e) if e.is_invalid_condition() => ErrorKind::InvalidCondition,
            OrmError::Expression(_) => ErrorKind::PlanError,
            OrmError::Plan(_) | OrmError::JoinPlan(_) | OrmError::Strategy(_) | OrmError::Cte(_) => {
                ErrorKind::PlanError
            }
            OrmError::Emit(_) | OrmError::Materialize(_) => ErrorKind::PlanError,
            // Delegates rather than collapsing to `PlanError`: a
            // constraint violation or cancellation raised inside
            // `run_in_transaction` must classify the same way it would
            // outside one (spec.md §7, §8 scenario 6).
            OrmError::Transaction(e) => e.kind(),
            OrmError::Driver(_) => ErrorKind::DriverError,
            OrmError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            OrmError::Cancellation => ErrorKind::CancellationError,
        }
    }
}
