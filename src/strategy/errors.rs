//! Errors for the Collection Strategy Engine (spec.md §4.5).

use thiserror::Error;

use crate::builder::errors::PlanError;
use crate::schema::errors::SchemaError;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("navigation `{0}` is not a to-many navigation and cannot back a collection field")]
    NotAToManyNavigation(String),

    #[error(transparent)]
    Expression(#[from] crate::expr::errors::ExpressionError),

    #[error(transparent)]
    Emit(#[from] Box<crate::emit::errors::EmitError>),

    #[error("the temp-table strategy requires a driver that supports multi-statement execution, or explicit separate-statement fallback; neither was available")]
    TempTableUnsupported,
}
