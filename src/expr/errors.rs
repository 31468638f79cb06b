//! Error types for expression/condition emission.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("operator `{operator}` cannot be applied to a null/absent right-hand side")]
    NullComparisonOperator { operator: String },

    #[error("`{operator}` requires a non-empty set")]
    EmptySetRequired { operator: String },

    #[error("raw fragment placeholder count ({placeholders}) does not match captured expression count ({captured})")]
    RawArityMismatch { placeholders: usize, captured: usize },

    #[error("dotted property path `{0}` was never resolved to a column before emission")]
    UnresolvedPath(String),
}

impl ExpressionError {
    /// True for the subset of variants spec.md §7 classifies as
    /// `InvalidCondition` rather than a generic `PlanError`.
    pub fn is_invalid_condition(&self) -> bool {
        matches!(
            self,
            ExpressionError::NullComparisonOperator { .. }
                | ExpressionError::EmptySetRequired { .. }
        )
    }
}
