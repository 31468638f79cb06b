//! Errors for navigation path resolution (spec.md §4.4, §7 mostly maps
//! these onto `ConfigurationError`/`PlanError` via `crate::error::OrmError`).

use thiserror::Error;

use crate::schema::errors::SchemaError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum JoinPlanError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("navigation path `{0}` is empty")]
    EmptyPath(String),

    #[error(
        "alias `{alias}` bound inside an enclosed subquery scope was referenced from an outer or sibling scope; each LATERAL/CTE subquery must build its join graph in a fresh, discarded scope (spec.md §4.4 alias-scoping invariant)"
    )]
    AliasEscapedScope { alias: String },
}
