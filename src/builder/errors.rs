//! Error types for builder-contract violations (spec.md §7 `PlanError`:
//! "builder used outside its contract").

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("offset() requires order_by() to be defined first")]
    OffsetWithoutOrderBy,

    #[error("having() may only be called on a grouped plan")]
    HavingRequiresGroupBy,

    #[error("group key `{0}` referenced in projection was never declared in group_by()")]
    UnknownGroupKey(String),

    #[error("collection field `{field}` requested per-parent limit/offset, which only the LATERAL collection strategy supports; select the `lateral` strategy or drop limit/offset")]
    PerParentLimitRequiresLateral { field: String },

    #[error("select() projection is empty; at least one field is required")]
    EmptyProjection,

    #[error("CTE name `{0}` is already registered in this plan")]
    DuplicateCteName(String),

    #[error("unknown CTE reference `{0}`")]
    UnknownCteReference(String),

    #[error("insert() requires at least one value row")]
    EmptyInsertValues,

    #[error("update() requires at least one assignment")]
    EmptyUpdateAssignments,

    #[error("bulk insert rows have inconsistent column sets")]
    InconsistentInsertColumns,
}
