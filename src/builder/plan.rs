//! The `Plan` value (spec.md §3 "Plan (a value; immutable between
//! builder steps)").
//!
//! A plain closed enum over plan variants rather than a type-state
//! generic builder tower — the Design Notes (spec.md §9) call either
//! acceptable, and the teacher's `LogicalPlan` favors a flat enum, so
//! this crate follows suit (see `DESIGN.md`).

use crate::builder::projection::ProjectedField;
use crate::config::QueryOptions;
use crate::expr::{Condition, Expr};
use crate::value::AppValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// What a join clause's `FROM`-clause item actually is (spec.md §4.3
/// `inner_join/left_join(target, cond, projection)`).
#[derive(Clone)]
pub enum JoinTarget {
    /// A plain table reference by registered entity name.
    Table { entity: String },
    /// A previously registered CTE, referenced by name (spec.md §4.6 "a
    /// CTE may be referenced as a join target in downstream builders").
    Cte { name: String },
    /// An inline derived table — the plan is rendered as a subquery in
    /// the `FROM`/`JOIN` clause (spec.md §4.3 `as_subquery(mode = table)`).
    /// `lateral` marks it `LEFT JOIN LATERAL (...)` (spec.md §4.5 LATERAL
    /// strategy), letting the subquery reference preceding `FROM` items.
    Subquery { plan: Box<Plan>, lateral: bool },
    /// An already-rendered derived table, for the handful of shapes the
    /// builder DSL can't express as a `Plan` (e.g. the LATERAL strategy's
    /// `json_agg(to_jsonb(t.*))`-over-a-derived-table wrapper, spec.md
    /// §4.5) — the same "pre-rendered SQL text" escape hatch `Expr::Subquery`
    /// uses for scalar subqueries.
    Raw { sql: String, lateral: bool },
}

#[derive(Clone)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub target: JoinTarget,
    pub alias: String,
    pub condition: Condition,
}

/// A named CTE captured by `with(...)` (spec.md §4.3, §4.6). Each
/// carries its own plan so the composer can number its parameters
/// consecutively into the shared vector at a stable offset.
#[derive(Clone)]
pub struct NamedCte {
    pub name: String,
    pub plan: Box<Plan>,
    /// Set by `with_aggregation` (spec.md §4.6): wraps `plan` as
    /// `SELECT <keys>, json_agg(to_jsonb(t.*)) AS <items_alias> FROM
    /// (<plan>) t GROUP BY <keys>` instead of emitting `plan` verbatim.
    pub aggregation: Option<CteAggregation>,
}

#[derive(Clone)]
pub struct CteAggregation {
    pub group_keys: Vec<Expr>,
    pub items_alias: String,
}

/// Subquery wrapping mode for `as_subquery(mode)` (spec.md §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubqueryMode {
    /// Usable as a scalar expression (`(<select single column>)`).
    Scalar,
    /// Usable as an array-producing expression (e.g. `ARRAY(<select>)`).
    Array,
    /// Usable as a `FROM`/`JOIN` derived table.
    Table,
}

/// One assignment column (used by INSERT and UPDATE plans).
#[derive(Clone)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

#[derive(Clone)]
pub struct InsertPlan {
    pub entity: String,
    /// Each inner `Vec` is one row's assignments; bulk insert when more
    /// than one (spec.md §4.7 "bulk insert chunks the value list").
    pub rows: Vec<Vec<Assignment>>,
    pub returning: Option<Vec<ProjectedField>>,
    pub conflict: Option<ConflictClause>,
}

/// `ON CONFLICT (...) DO UPDATE SET ... [WHERE ...]` (spec.md §4.7
/// upsert rendering).
#[derive(Clone)]
pub struct ConflictClause {
    pub target_columns: Vec<String>,
    pub target_where: Option<Condition>,
    pub set: Vec<Assignment>,
    pub set_where: Option<Condition>,
}

#[derive(Clone)]
pub struct UpdatePlan {
    pub entity: String,
    pub alias: String,
    pub assignments: Vec<Assignment>,
    pub filters: Vec<Condition>,
    pub returning: Option<Vec<ProjectedField>>,
}

#[derive(Clone)]
pub struct DeletePlan {
    pub entity: String,
    pub alias: String,
    pub filters: Vec<Condition>,
    pub returning: Option<Vec<ProjectedField>>,
}

#[derive(Clone)]
pub enum PlanVariant {
    /// No `select()` called yet — a bare `EntityBuilder` plan. Only
    /// `count`/`exists`/mutation transitions are meaningful here; `to_list`
    /// on a plan in this state projects every declared property (spec.md
    /// §4.3 describes `select` as the transition into a Select plan, but
    /// callers are allowed to terminate without ever calling it).
    Entity,
    Select {
        projection: Vec<ProjectedField>,
    },
    Grouped {
        group_keys: Vec<(String, Expr)>,
        having: Vec<Condition>,
        projection: Vec<ProjectedField>,
    },
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
}

/// The plan value itself. Immutable between builder steps: every
/// builder method in `src/builder/query.rs` takes `&Plan` (or `Plan` by
/// value) and returns a new, extended `Plan` (spec.md §3 "append-only").
#[derive(Clone)]
pub struct Plan {
    pub root_entity: String,
    pub root_alias: String,
    pub filters: Vec<Condition>,
    pub order_by: Vec<(Expr, Direction)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub is_distinct: bool,
    pub joins: Vec<JoinClause>,
    pub ctes: Vec<NamedCte>,
    pub query_options: Option<QueryOptions>,
    pub variant: PlanVariant,
}

impl Plan {
    /// A fresh `EntityBuilder`-equivalent plan rooted at `entity`, aliased
    /// by convention to its lowercased first letter followed by a stable
    /// counter-free default — callers needing control over the alias use
    /// `Plan::rooted`.
    pub fn new(entity: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            root_entity: entity.into(),
            root_alias: alias.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            is_distinct: false,
            joins: Vec::new(),
            ctes: Vec::new(),
            query_options: None,
            variant: PlanVariant::Entity,
        }
    }

    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn projection(&self) -> Option<&[ProjectedField]> {
        match &self.variant {
            PlanVariant::Select { projection } => Some(projection),
            PlanVariant::Grouped { projection, .. } => Some(projection),
            _ => None,
        }
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self.variant, PlanVariant::Grouped { .. })
    }

    /// spec.md §4.3 "a `select(projection)` that contains at least one
    /// Collection field forces downstream operations (`order_by`,
    /// `limit`, `offset`) to apply to the outer query" — this reports
    /// whether the *currently selected* projection has any such field, so
    /// builder methods can decide whether a fresh `order_by`/`limit`
    /// layered on top of an existing Select plan should discard the
    /// pre-select ordering (spec.md's wording) or extend it.
    pub fn projection_has_collection(&self) -> bool {
        self.projection()
            .map(ProjectedField::has_collection_field)
            .unwrap_or(false)
    }
}

/// A constant value used directly in a builder call (e.g. `.where_eq(col,
/// AppValue::Int(5))`), wrapped to an `Expr::Constant` by the query
/// builder surface.
pub fn constant(value: AppValue) -> Expr {
    Expr::Constant(value)
}
