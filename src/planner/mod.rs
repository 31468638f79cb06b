//! Navigation Join Planner (spec.md §4.4).
//!
//! Resolves relationship paths referenced by filters, projections, or
//! explicit joins into a join graph over the root table, with stable,
//! deterministic aliases and no duplicate joins. Grounded on
//! `render_plan::join_builder`'s alias-derivation/join-kind-selection
//! logic and `render_plan::alias_resolver`'s scoping discipline.

pub mod errors;

use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::plan::JoinKind;
use crate::expr::{Condition, Expr};
use crate::schema::{KeyPart, NavigationDescriptor, SchemaRegistry, ValueMapper};
use errors::JoinPlanError;

/// One join the planner decided is needed, in discovery order.
#[derive(Clone)]
pub struct ResolvedJoin {
    pub alias: String,
    pub entity: String,
    pub kind: JoinKind,
    pub condition: Condition,
}

/// The column + mapper a dotted path resolves to, after the joins it
/// required have been registered into the enclosing `JoinScope`.
pub struct ResolvedScalar {
    pub expr: Expr,
    pub mapper: Option<Arc<dyn ValueMapper>>,
}

/// A fresh, self-contained join-graph accumulator. Every LATERAL
/// collection subquery and every CTE builds its own `JoinScope` and
/// discards it on completion (spec.md §4.4 "alias isolation" invariant)
/// — because nothing is shared between `JoinScope` instances, an inner
/// scope's aliases structurally cannot leak into a sibling's: there is no
/// shared mutable alias table for them to leak through.
pub struct JoinScope {
    root_entity: String,
    root_alias: String,
    joins: Vec<ResolvedJoin>,
    /// Dedup key: `(parent_alias, navigation_property)` → the alias
    /// already assigned for that exact path segment (spec.md §4.4 step 3:
    /// "the same target appears via different navigation properties, each
    /// path gets its own alias — the two are not coalesced", which this
    /// key also guarantees since it's keyed by property name, not target
    /// entity).
    seen: HashMap<(String, String), String>,
}

impl JoinScope {
    pub fn new(root_entity: impl Into<String>, root_alias: impl Into<String>) -> Self {
        Self {
            root_entity: root_entity.into(),
            root_alias: root_alias.into(),
            joins: Vec::new(),
            seen: HashMap::new(),
        }
    }

    /// spec.md §4.4 step 2: the canonical alias is a pure function of the
    /// parent alias and the navigation's property name, so the same path
    /// from the same root always yields the same alias.
    fn alias_for(parent_alias: &str, nav_property: &str) -> String {
        format!("{}__{}", parent_alias, nav_property)
    }

    /// Follows a root-anchored dotted path (spec.md §4.2/§4.4), e.g.
    /// `post.user.last_active_at`; registers every join segment it needs
    /// (deduped) and returns the resolved column + mapper for the final
    /// property.
    pub fn resolve_path(
        &mut self,
        registry: &SchemaRegistry,
        path: &str,
    ) -> Result<ResolvedScalar, JoinPlanError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.is_empty() || segments[0].is_empty() {
            return Err(JoinPlanError::EmptyPath(path.to_string()));
        }

        let mut current_entity = self.root_entity.clone();
        let mut current_alias = self.root_alias.clone();

        for segment in &segments[..segments.len().saturating_sub(1)] {
            let descriptor = registry.get(&current_entity)?;
            let nav = descriptor
                .navigation(segment)
                .ok_or_else(|| JoinPlanError::Schema(crate::schema::errors::SchemaError::NavigationNotFound {
                    entity: current_entity.clone(),
                    navigation: segment.to_string(),
                }))?;

            let dedup_key = (current_alias.clone(), segment.to_string());
            let alias = if let Some(existing) = self.seen.get(&dedup_key) {
                existing.clone()
            } else {
                let alias = Self::alias_for(&current_alias, segment);
                let condition = build_on_condition(nav, &current_alias, &alias);
                self.joins.push(ResolvedJoin {
                    alias: alias.clone(),
                    entity: nav.target_entity.clone(),
                    kind: join_kind(nav),
                    condition,
                });
                self.seen.insert(dedup_key, alias.clone());
                alias
            };

            current_entity = nav.target_entity.clone();
            current_alias = alias;
        }

        let last = segments.last().expect("checked non-empty above");
        let descriptor = registry.get(&current_entity)?;
        let property = descriptor
            .property(last)
            .ok_or_else(|| JoinPlanError::Schema(crate::schema::errors::SchemaError::PropertyNotFound {
                entity: current_entity.clone(),
                property: last.to_string(),
            }))?;

        Ok(ResolvedScalar {
            expr: Expr::Column {
                alias: current_alias,
                column: property.column_name.clone(),
            },
            mapper: property.value_mapper.clone(),
        })
    }

    pub fn into_joins(self) -> Vec<ResolvedJoin> {
        self.joins
    }

    pub fn joins(&self) -> &[ResolvedJoin] {
        &self.joins
    }

    /// Rewrites every `Expr::Path` inside `expr` into a resolved
    /// `Expr::Column`, registering whatever joins it needed. Everything
    /// else in the tree is returned unchanged (spec.md §4.4: the planner
    /// only ever touches path references, never the rest of the tree).
    pub fn resolve_expr(&mut self, registry: &SchemaRegistry, expr: &Expr) -> Result<Expr, JoinPlanError> {
        match expr {
            Expr::Path(path) => Ok(self.resolve_path(registry, path)?.expr),
            Expr::Column { .. } | Expr::Constant(_) | Expr::Subquery(_) => Ok(expr.clone()),
            Expr::Raw { template, captured } => Ok(Expr::Raw {
                template: template.clone(),
                captured: captured
                    .iter()
                    .map(|e| self.resolve_expr(registry, e))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            Expr::Aggregate { func, arg, distinct } => Ok(Expr::Aggregate {
                func: *func,
                arg: Box::new(self.resolve_expr(registry, arg)?),
                distinct: *distinct,
            }),
            Expr::List(items) => Ok(Expr::List(
                items
                    .iter()
                    .map(|e| self.resolve_expr(registry, e))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        }
    }

    /// Same rewrite, applied to every `Expr` reachable from a `Condition`
    /// tree (filters, `having`, join `ON` clauses).
    pub fn resolve_condition(&mut self, registry: &SchemaRegistry, condition: &Condition) -> Result<Condition, JoinPlanError> {
        let e = |scope: &mut Self, expr: &Expr| scope.resolve_expr(registry, expr);
        Ok(match condition {
            Condition::Eq(lhs, rhs) => Condition::Eq(
                e(self, lhs)?,
                rhs.as_ref().map(|r| e(self, r)).transpose()?,
            ),
            Condition::Ne(lhs, rhs) => Condition::Ne(
                e(self, lhs)?,
                rhs.as_ref().map(|r| e(self, r)).transpose()?,
            ),
            Condition::Gt(lhs, rhs) => Condition::Gt(e(self, lhs)?, e(self, rhs)?),
            Condition::Gte(lhs, rhs) => Condition::Gte(e(self, lhs)?, e(self, rhs)?),
            Condition::Lt(lhs, rhs) => Condition::Lt(e(self, lhs)?, e(self, rhs)?),
            Condition::Lte(lhs, rhs) => Condition::Lte(e(self, lhs)?, e(self, rhs)?),
            Condition::Like(lhs, rhs) => Condition::Like(e(self, lhs)?, e(self, rhs)?),
            Condition::Between(col, lo, hi) => {
                Condition::Between(e(self, col)?, e(self, lo)?, e(self, hi)?)
            }
            Condition::InArray(col, items) => Condition::InArray(
                e(self, col)?,
                items
                    .iter()
                    .map(|i| e(self, i))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Condition::InSubquery(col, sql) => Condition::InSubquery(e(self, col)?, sql.clone()),
            Condition::IsNull(expr) => Condition::IsNull(e(self, expr)?),
            Condition::IsNotNull(expr) => Condition::IsNotNull(e(self, expr)?),
            Condition::Exists(sql) => Condition::Exists(sql.clone()),
            Condition::NotExists(sql) => Condition::NotExists(sql.clone()),
            Condition::And(items) => Condition::And(
                items
                    .iter()
                    .map(|c| self.resolve_condition(registry, c))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Condition::Or(items) => Condition::Or(
                items
                    .iter()
                    .map(|c| self.resolve_condition(registry, c))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Condition::Not(inner) => Condition::Not(Box::new(self.resolve_condition(registry, inner)?)),
            Condition::Raw { template, captured } => Condition::Raw {
                template: template.clone(),
                captured: captured
                    .iter()
                    .map(|c| e(self, c))
                    .collect::<Result<Vec<_>, _>>()?,
            },
        })
    }

    /// Same rewrite, applied to one projection leaf. `Scalar` nodes built
    /// from a bare `Expr::Path` with no explicit mapper pick up the
    /// mapper the schema registry attaches to that property for free —
    /// callers who built the leaf with `scalar_mapped` keep whatever
    /// mapper they supplied (an explicit mapper always wins). `Object`
    /// recurses; `Collection` is left untouched; its child plan gets its
    /// own fresh `JoinScope` rooted at the child's own alias when it is
    /// rendered (spec.md §4.4 alias isolation).
    pub fn resolve_projected_field(
        &mut self,
        registry: &SchemaRegistry,
        field: &crate::builder::projection::ProjectedField,
    ) -> Result<crate::builder::projection::ProjectedField, JoinPlanError> {
        use crate::builder::projection::{ProjectedField, ProjectionNode};

        let node = match &field.node {
            ProjectionNode::Scalar { expr, mapper } => {
                if let (Expr::Path(path), None) = (expr, mapper) {
                    let resolved = self.resolve_path(registry, path)?;
                    ProjectionNode::Scalar {
                        expr: resolved.expr,
                        mapper: resolved.mapper,
                    }
                } else {
                    ProjectionNode::Scalar {
                        expr: self.resolve_expr(registry, expr)?,
                        mapper: mapper.clone(),
                    }
                }
            }
            ProjectionNode::Object { fields } => {
                let resolved = fields
                    .iter()
                    .map(|f| self.resolve_projected_field(registry, f))
                    .collect::<Result<Vec<_>, _>>()?;
                ProjectionNode::Object { fields: resolved }
            }
            ProjectionNode::Collection {
                child,
                navigation,
                terminal,
            } => ProjectionNode::Collection {
                child: child.clone(),
                navigation: navigation.clone(),
                terminal: terminal.clone(),
            },
        };

        Ok(ProjectedField {
            name: field.name.clone(),
            node,
        })
    }
}

/// spec.md §4.4 step 3: mandatory navigation ⇒ `INNER JOIN`; optional ⇒
/// `LEFT JOIN`.
fn join_kind(nav: &NavigationDescriptor) -> JoinKind {
    if nav.is_mandatory {
        JoinKind::Inner
    } else {
        JoinKind::Left
    }
}

/// spec.md §4.4 step 4: emit `ON` predicates over the navigation's key
/// tuple. The physical foreign-key column lives on the entity that holds
/// the `one` side of the relationship — the declaring entity for a
/// `kind = One` navigation, the target entity for a `kind = Many` one —
/// independent of `is_inverse` (which only decides which side emits the
/// FK *constraint*, spec.md §3 invariant).
fn build_on_condition(nav: &NavigationDescriptor, parent_alias: &str, joined_alias: &str) -> Condition {
    use crate::schema::NavigationKind;

    let (fk_alias, pk_alias) = match nav.kind {
        NavigationKind::One => (parent_alias, joined_alias),
        NavigationKind::Many => (joined_alias, parent_alias),
    };

    let parts: Vec<Condition> = nav
        .key
        .iter()
        .map(|part| match part {
            KeyPart::Columns {
                foreign_key_column,
                principal_key_column,
            } => Condition::Eq(
                Expr::Column {
                    alias: fk_alias.to_string(),
                    column: foreign_key_column.clone(),
                },
                Some(Expr::Column {
                    alias: pk_alias.to_string(),
                    column: principal_key_column.clone(),
                }),
            ),
            KeyPart::Literal { column, value } => Condition::Raw {
                template: format!("{{}} = {}", value.to_sql()),
                captured: vec![Expr::Column {
                    alias: fk_alias.to_string(),
                    column: column.clone(),
                }],
            },
        })
        .collect();

    if parts.len() == 1 {
        parts.into_iter().next().unwrap()
    } else {
        Condition::And(parts)
    }
}
