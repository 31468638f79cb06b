//! Query Builder Graph (spec.md §4.3).

pub mod errors;
pub mod plan;
pub mod projection;
pub mod query;

pub use plan::{
    Assignment, ConflictClause, CteAggregation, DeletePlan, Direction, InsertPlan, JoinClause,
    JoinKind, JoinTarget, NamedCte, Plan, PlanVariant, SubqueryMode, UpdatePlan,
};
pub use projection::{CollectionTerminal, ProjectedField, ProjectionNode};
pub use query::QueryBuilder;
