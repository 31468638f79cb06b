//! Errors for SQL emission (spec.md §4.7).

use thiserror::Error;

use crate::builder::errors::PlanError;
use crate::cte::errors::CteError;
use crate::expr::errors::ExpressionError;
use crate::planner::errors::JoinPlanError;
use crate::schema::errors::SchemaError;
use crate::strategy::errors::StrategyError;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    JoinPlan(#[from] JoinPlanError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Cte(#[from] CteError),

    #[error("bulk insert exceeds the driver's bound-parameter ceiling even after chunking to a single row ({columns} columns per row, ceiling {ceiling})")]
    InsertRowExceedsParamCeiling { columns: usize, ceiling: usize },

    #[error("{operation} requires a non-empty returning() projection to decode rows from")]
    ReturningRequired { operation: &'static str },
}
