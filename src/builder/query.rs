//! The fluent builder surface (spec.md §4.3 "Query Builder Graph").
//!
//! Every method takes `self` by value and returns a new `QueryBuilder`
//! wrapping an extended `Plan` — append-only, immutable between steps
//! (spec.md §3). This is the redesign spec.md's Design Notes (§9) call
//! for in place of a type-state generic builder tower: a loosely typed
//! `Plan` with runtime validation, grounded on the teacher's flat
//! `LogicalPlan` enum style.

use log::debug;

use crate::builder::errors::PlanError;
use crate::builder::plan::{
    Assignment, ConflictClause, DeletePlan, Direction, InsertPlan, JoinClause, JoinKind,
    JoinTarget, NamedCte, Plan, PlanVariant, UpdatePlan,
};
use crate::builder::projection::ProjectedField;
use crate::expr::{Condition, Expr};

/// Wraps a `Plan` with the fluent surface. The uniform surface across
/// Entity/Select/Grouped/Joined variants (spec.md §4.3) is achieved by
/// keeping every method available on `QueryBuilder` regardless of the
/// wrapped plan's variant; variant-specific contract violations (e.g.
/// `having()` on a non-grouped plan) are caught at the call site and
/// returned as a `PlanError`, not hidden behind a type that makes the
/// call unreachable.
#[derive(Clone)]
pub struct QueryBuilder {
    pub plan: Plan,
}

impl QueryBuilder {
    pub fn new(entity: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            plan: Plan::new(entity, alias),
        }
    }

    pub fn from_plan(plan: Plan) -> Self {
        Self { plan }
    }

    /// `where(p)` — conjoin a `Condition` to `filters` (spec.md §4.3).
    pub fn filter(mut self, condition: Condition) -> Self {
        self.plan.filters.push(condition);
        self
    }

    /// `order_by(list)` — append an ordering key (spec.md §4.3). Plan-level
    /// ordering always describes the outer query; a collection field's
    /// own per-row ordering is set on its child plan instead
    /// (`posts.order_by(...).select(...)`, spec.md §4.5 scenario 2).
    pub fn order_by(mut self, expr: Expr, direction: Direction) -> Self {
        self.plan.order_by.push((expr, direction));
        self
    }

    /// `limit(n)` (spec.md §4.3).
    pub fn limit(mut self, n: u64) -> Self {
        self.plan.limit = Some(n);
        self
    }

    /// `offset(n)` — requires `order_by` be defined first (spec.md §4.3,
    /// enforced here rather than deferred to the emitter so the caller
    /// gets the `PlanError` at the point of the mistake).
    pub fn offset(mut self, n: u64) -> Result<Self, PlanError> {
        if !self.plan.has_order_by() {
            return Err(PlanError::OffsetWithoutOrderBy);
        }
        self.plan.offset = Some(n);
        Ok(self)
    }

    pub fn distinct(mut self) -> Self {
        self.plan.is_distinct = true;
        self
    }

    /// `select(projection_fn)` — transition to a Select plan (spec.md
    /// §4.3). When the new projection contains at least one Collection
    /// field, any ordering/limit/offset declared before this call is
    /// discarded: it described a pre-select plan whose row shape no
    /// longer matches the projected outer query (spec.md §4.3 "the
    /// original (pre-select) builder's ordering is discarded").
    pub fn select(mut self, projection: Vec<ProjectedField>) -> Result<Self, PlanError> {
        if projection.is_empty() {
            return Err(PlanError::EmptyProjection);
        }
        if ProjectedField::has_collection_field(&projection) {
            if self.plan.has_order_by() || self.plan.limit.is_some() || self.plan.offset.is_some() {
                debug!(
                    "discarding pre-select order_by/limit/offset on {}: projection contains a collection field",
                    self.plan.root_alias
                );
            }
            self.plan.order_by.clear();
            self.plan.limit = None;
            self.plan.offset = None;
        }
        self.plan.variant = PlanVariant::Select { projection };
        Ok(self)
    }

    /// `group_by(key_fn)` — transition to a Grouped plan (spec.md §4.3).
    /// Subsequent `select()` calls on this builder must only reference
    /// these keys via `.key.*` plus aggregate expressions; that
    /// constraint is enforced by `select_grouped`, not this method.
    pub fn group_by(mut self, keys: Vec<(String, Expr)>) -> Self {
        self.plan.variant = PlanVariant::Grouped {
            group_keys: keys,
            having: Vec::new(),
            projection: Vec::new(),
        };
        self
    }

    /// `select(projection_fn)` for a Grouped plan: the projection is
    /// expressed over the synthetic row whose `.key.*` names resolve to
    /// group keys (spec.md §3 "Grouped plan"). Every group-key reference
    /// in `projection` must name a key declared in `group_by`.
    pub fn select_grouped(
        mut self,
        projection: Vec<ProjectedField>,
        referenced_group_keys: &[String],
    ) -> Result<Self, PlanError> {
        let PlanVariant::Grouped { group_keys, having, .. } = &self.plan.variant else {
            return Err(PlanError::HavingRequiresGroupBy);
        };
        for key in referenced_group_keys {
            if !group_keys.iter().any(|(name, _)| name == key) {
                return Err(PlanError::UnknownGroupKey(key.clone()));
            }
        }
        if projection.is_empty() {
            return Err(PlanError::EmptyProjection);
        }
        let group_keys = group_keys.clone();
        let having = having.clone();
        self.plan.variant = PlanVariant::Grouped {
            group_keys,
            having,
            projection,
        };
        Ok(self)
    }

    /// `having(p)` — conjoin a `Condition` into `having` (grouped only,
    /// spec.md §4.3).
    pub fn having(mut self, condition: Condition) -> Result<Self, PlanError> {
        match &mut self.plan.variant {
            PlanVariant::Grouped { having, .. } => {
                having.push(condition);
                Ok(self)
            }
            _ => Err(PlanError::HavingRequiresGroupBy),
        }
    }

    fn join(mut self, kind: JoinKind, target: JoinTarget, alias: impl Into<String>, condition: Condition) -> Self {
        self.plan.joins.push(JoinClause {
            kind,
            target,
            alias: alias.into(),
            condition,
        });
        self
    }

    /// `inner_join(target, cond, ...)` (spec.md §4.3).
    pub fn inner_join(self, target: JoinTarget, alias: impl Into<String>, condition: Condition) -> Self {
        self.join(JoinKind::Inner, target, alias, condition)
    }

    /// `left_join(target, cond, ...)` (spec.md §4.3).
    pub fn left_join(self, target: JoinTarget, alias: impl Into<String>, condition: Condition) -> Self {
        self.join(JoinKind::Left, target, alias, condition)
    }

    /// `with(ctes…)` — register named CTEs available by identifier in
    /// join targets (spec.md §4.3).
    pub fn with(mut self, cte: NamedCte) -> Result<Self, PlanError> {
        if self.plan.ctes.iter().any(|existing| existing.name == cte.name) {
            return Err(PlanError::DuplicateCteName(cte.name));
        }
        self.plan.ctes.push(cte);
        Ok(self)
    }

    /// `with_query_options({…})` — per-query override of the engine-wide
    /// defaults (spec.md §6).
    pub fn with_query_options(mut self, options: crate::config::QueryOptions) -> Self {
        self.plan.query_options = Some(options);
        self
    }

    /// `as_subquery(mode)` — wraps the plan for use as an expression or
    /// join target (spec.md §4.3). The mode itself only governs how a
    /// *caller* embeds the returned `Plan` (a scalar/array expression via
    /// `crate::emit`'s subquery helpers, or a `JoinTarget::Subquery` with
    /// `lateral: false`) — the plan value itself is unchanged.
    pub fn as_subquery(self, mode: crate::builder::plan::SubqueryMode) -> (Plan, crate::builder::plan::SubqueryMode) {
        (self.plan, mode)
    }

    pub fn insert(self, entity: impl Into<String>, rows: Vec<Vec<Assignment>>) -> Result<Plan, PlanError> {
        if rows.is_empty() {
            return Err(PlanError::EmptyInsertValues);
        }
        let first_columns: Vec<&str> = rows[0].iter().map(|a| a.column.as_str()).collect();
        for row in &rows[1..] {
            let columns: Vec<&str> = row.iter().map(|a| a.column.as_str()).collect();
            if columns != first_columns {
                return Err(PlanError::InconsistentInsertColumns);
            }
        }
        let mut plan = self.plan;
        let entity = entity.into();
        plan.root_entity = entity.clone();
        plan.variant = PlanVariant::Insert(InsertPlan {
            entity,
            rows,
            returning: None,
            conflict: None,
        });
        Ok(plan)
    }

    pub fn returning(mut self, projection: Vec<ProjectedField>) -> Self {
        match &mut self.plan.variant {
            PlanVariant::Insert(insert) => insert.returning = Some(projection),
            PlanVariant::Update(update) => update.returning = Some(projection),
            PlanVariant::Delete(delete) => delete.returning = Some(projection),
            _ => {}
        }
        self
    }

    /// `upsert`: INSERT plus `ON CONFLICT` resolution (spec.md §3
    /// "Mutation plans", §4.7).
    pub fn on_conflict(mut self, conflict: ConflictClause) -> Result<Self, PlanError> {
        match &mut self.plan.variant {
            PlanVariant::Insert(insert) => {
                insert.conflict = Some(conflict);
                Ok(self)
            }
            _ => Err(PlanError::EmptyInsertValues),
        }
    }

    pub fn update(self, entity: impl Into<String>, alias: impl Into<String>, assignments: Vec<Assignment>) -> Result<Plan, PlanError> {
        if assignments.is_empty() {
            return Err(PlanError::EmptyUpdateAssignments);
        }
        let mut plan = self.plan;
        let entity = entity.into();
        plan.root_entity = entity.clone();
        let filters = std::mem::take(&mut plan.filters);
        plan.variant = PlanVariant::Update(UpdatePlan {
            entity,
            alias: alias.into(),
            assignments,
            filters,
            returning: None,
        });
        Ok(plan)
    }

    pub fn delete(self, entity: impl Into<String>, alias: impl Into<String>) -> Plan {
        let mut plan = self.plan;
        let entity = entity.into();
        plan.root_entity = entity.clone();
        let filters = std::mem::take(&mut plan.filters);
        plan.variant = PlanVariant::Delete(DeletePlan {
            entity,
            alias: alias.into(),
            filters,
            returning: None,
        });
        plan
    }

    pub fn build(self) -> Plan {
        self.plan
    }
}
