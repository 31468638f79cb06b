//! Collection Strategy Engine (spec.md §4.5).
//!
//! Three interchangeable mechanisms for materializing a one-to-many
//! projection field, behind one dispatch point. Grounded on
//! `render_plan::cte_manager`'s strategy-pattern `CteManager` and
//! exograph's `transform::pg::select::selection_strategy::
//! SelectionStrategy` trait (`suitable`/`to_select` reused here as
//! `applicable`/`render`).

pub mod cte;
pub mod errors;
pub mod lateral;
pub mod temptable;

use crate::builder::plan::{JoinClause, JoinKind, JoinTarget, Plan};
use crate::builder::projection::{CollectionTerminal, ProjectedField, ProjectionNode};
use crate::config::CollectionStrategy;
use crate::expr::{Condition, EmitCtx, Expr};
use crate::schema::{NavigationDescriptor, NavigationKind, SchemaRegistry};
use errors::StrategyError;

/// What a strategy hands back to the enclosing `SELECT` emitter for one
/// collection field: the expression to place in the outer projection
/// list, plus whatever extra `WITH`/`FROM` machinery that expression
/// depends on.
pub struct RenderedCollection {
    pub select_expr: String,
    /// `(name, body)` pairs appended to the outer plan's `WITH` clause
    /// (CTE strategy only).
    pub extra_ctes: Vec<(String, String)>,
    /// Extra `FROM`-clause joins the outer query needs (CTE and LATERAL
    /// both append one join per collection field; temp-table appends
    /// none — it joins against a table created out of band).
    pub extra_joins: Vec<JoinClause>,
}

/// Resolves the to-many `NavigationDescriptor` backing a collection
/// field and the physical correlation columns, in the same FK-side
/// convention the join planner uses (spec.md glossary "Correlation
/// key"; spec.md §4.4 step 4 for the general rule this specializes).
pub fn correlation_columns<'a>(
    registry: &'a SchemaRegistry,
    parent_entity: &str,
    navigation: &str,
) -> Result<(std::sync::Arc<crate::schema::EntityDescriptor>, String, String), StrategyError> {
    let parent = registry.get(parent_entity)?;
    let nav = parent
        .navigation(navigation)
        .ok_or_else(|| StrategyError::Schema(crate::schema::errors::SchemaError::NavigationNotFound {
            entity: parent_entity.to_string(),
            navigation: navigation.to_string(),
        }))?;
    if nav.kind != NavigationKind::Many {
        return Err(StrategyError::NotAToManyNavigation(navigation.to_string()));
    }
    let (parent_key_col, child_key_col) = key_columns(nav)?;
    let target = registry.get(&nav.target_entity)?;
    let _ = target;
    Ok((parent, parent_key_col, child_key_col))
}

/// Extracts the single-column correlation key pair from a `Many`
/// navigation. Composite keys are supported by the join planner in
/// general (spec.md §3), but the strategy engine's correlation join
/// needs exactly one pair to key a `GROUP BY`/`PARTITION BY`; a
/// navigation declaring more than one key part is rejected here rather
/// than silently dropping parts.
fn key_columns(nav: &NavigationDescriptor) -> Result<(String, String), StrategyError> {
    use crate::schema::KeyPart;
    if nav.key.len() != 1 {
        return Err(StrategyError::NotAToManyNavigation(nav.property_name.clone()));
    }
    match &nav.key[0] {
        // Many navigation: the FK column lives on the target (child) side,
        // the principal key lives on the parent (spec.md §4.4 rule).
        KeyPart::Columns {
            foreign_key_column,
            principal_key_column,
        } => Ok((principal_key_column.clone(), foreign_key_column.clone())),
        KeyPart::Literal { .. } => Err(StrategyError::NotAToManyNavigation(nav.property_name.clone())),
    }
}

/// Dispatches to the configured strategy, after validating the
/// per-parent `LIMIT`/`OFFSET` rule (spec.md §9 Open Question: only
/// `lateral` honors it; `cte`/`temptable` reject it outright rather than
/// silently applying it globally).
pub fn render_collection_field(
    strategy: CollectionStrategy,
    registry: &SchemaRegistry,
    parent_entity: &str,
    parent_alias: &str,
    field_name: &str,
    navigation: &str,
    child: &Plan,
    terminal: &CollectionTerminal,
    ctx: &mut EmitCtx,
) -> Result<RenderedCollection, StrategyError> {
    // A simple scalar aggregate with no per-parent limit/offset is a
    // single value per parent row; it can always be satisfied with a
    // plain correlated subquery, independent of the configured strategy
    // (spec.md §9 Open Question). Once the caller asks for a per-parent
    // limit/offset even on one of these terminals, the general
    // LATERAL-only machinery below takes over instead.
    if terminal.is_simple_scalar_aggregate() && child.limit.is_none() && child.offset.is_none() {
        return render_inline_scalar_aggregate(registry, parent_entity, parent_alias, navigation, child, terminal, ctx);
    }

    let wants_per_parent_limit = child.limit.is_some() || child.offset.is_some();
    if wants_per_parent_limit && strategy != CollectionStrategy::Lateral {
        return Err(StrategyError::Plan(
            crate::builder::errors::PlanError::PerParentLimitRequiresLateral {
                field: field_name.to_string(),
            },
        ));
    }

    match strategy {
        CollectionStrategy::Cte => {
            cte::render(registry, parent_entity, parent_alias, field_name, navigation, child, terminal, ctx)
        }
        CollectionStrategy::Lateral => {
            lateral::render(registry, parent_entity, parent_alias, field_name, navigation, child, terminal, ctx)
        }
        CollectionStrategy::TempTable => {
            temptable::render_inline(registry, parent_entity, parent_alias, field_name, navigation, child, terminal, ctx)
        }
    }
}

/// spec.md §9 Open Question resolution: `count`/`sum`/`min`/`max`/`exists`/
/// `first_or_default` with no per-parent limit/offset don't need a
/// per-parent row join at all — a plain correlated subquery gets the same
/// answer regardless of which `CollectionStrategy` is configured.
/// Grounded on `render_plan::cte_manager`'s own early-exit for count-only
/// projections, generalized here to the rest of the scalar terminals.
fn render_inline_scalar_aggregate(
    registry: &SchemaRegistry,
    parent_entity: &str,
    parent_alias: &str,
    navigation: &str,
    child: &Plan,
    terminal: &CollectionTerminal,
    ctx: &mut EmitCtx,
) -> Result<RenderedCollection, StrategyError> {
    let (_target, parent_key_col, child_key_col) = correlation_columns(registry, parent_entity, navigation)?;
    let child_alias = child.root_alias.clone();

    let mut correlated = child.clone();
    correlated.filters.push(correlation_condition(
        parent_alias,
        &parent_key_col,
        &child_alias,
        &child_key_col,
    ));

    let select_expr = scalar_aggregate_sql(&correlated, registry, terminal, ctx)?;

    Ok(RenderedCollection {
        select_expr,
        extra_ctes: Vec::new(),
        extra_joins: Vec::new(),
    })
}

/// Renders one of the simple scalar-aggregate terminals as a correlated
/// subquery expression over `correlated` (a child plan whose own filters
/// already pin it to one parent row). Shared by the inline shortcut above
/// and by the LATERAL strategy, which reaches the same terminals when a
/// per-parent limit/offset forces it through the general dispatch instead
/// (spec.md §4.5/§9).
pub(crate) fn scalar_aggregate_sql(
    correlated: &Plan,
    registry: &SchemaRegistry,
    terminal: &CollectionTerminal,
    ctx: &mut EmitCtx,
) -> Result<String, StrategyError> {
    Ok(match terminal {
        CollectionTerminal::Count => {
            let inner = crate::emit::emit_row_select(correlated, registry, ctx, None).map_err(Box::new)?;
            format!("COALESCE((SELECT count(*) FROM ({}) t), 0)", inner)
        }
        CollectionTerminal::Exists => {
            let inner = crate::emit::emit_row_select(correlated, registry, ctx, None).map_err(Box::new)?;
            format!("EXISTS (SELECT 1 FROM ({}) t)", inner)
        }
        CollectionTerminal::Sum(expr) | CollectionTerminal::Min(expr) | CollectionTerminal::Max(expr) => {
            let agg = match terminal {
                CollectionTerminal::Sum(_) => "sum",
                CollectionTerminal::Min(_) => "min",
                _ => "max",
            };
            let inner = crate::emit::emit_row_select(correlated, registry, ctx, Some(("__agg_target", expr.clone())))
                .map_err(Box::new)?;
            format!("(SELECT {}(t.\"__agg_target\") FROM ({}) t)", agg, inner)
        }
        CollectionTerminal::FirstOrDefault => {
            let mut limited = correlated.clone();
            limited.limit = Some(1);
            let inner = crate::emit::emit_row_select(&limited, registry, ctx, None).map_err(Box::new)?;
            format!("(SELECT to_jsonb(t) FROM ({}) t)", inner)
        }
        CollectionTerminal::ToList | CollectionTerminal::ToPrimitiveList | CollectionTerminal::SelectMany => {
            unreachable!("not a simple scalar aggregate terminal")
        }
    })
}

/// spec.md §8 "Coalesce": the SQL expression wrapping rule shared by
/// every strategy's simple terminals once it has a per-parent JSON
/// array (`items`) or aggregate scalar in hand.
pub(crate) fn wrap_terminal(terminal: &CollectionTerminal, items_sql: &str) -> String {
    match terminal {
        CollectionTerminal::ToList | CollectionTerminal::SelectMany => {
            format!("COALESCE({items}, '[]'::jsonb)", items = items_sql)
        }
        CollectionTerminal::ToPrimitiveList => {
            format!("COALESCE({items}, '[]'::jsonb)", items = items_sql)
        }
        CollectionTerminal::FirstOrDefault => format!("({items} -> 0)", items = items_sql),
        CollectionTerminal::Count => format!(
            "COALESCE(jsonb_array_length({items}), 0)",
            items = items_sql
        ),
        CollectionTerminal::Exists => format!(
            "COALESCE(jsonb_array_length({items}) > 0, false)",
            items = items_sql
        ),
        CollectionTerminal::Sum(_) | CollectionTerminal::Min(_) | CollectionTerminal::Max(_) => {
            items_sql.to_string()
        }
    }
}

/// Finds the one scalar leaf expression a primitive collection or
/// scalar-aggregate terminal projects (spec.md §4.5 `to_primitive_list`,
/// `sum/min/max`): these terminals don't carry a full object shape, just
/// one column.
pub(crate) fn single_scalar_field(projection: &[ProjectedField]) -> Option<&Expr> {
    projection.iter().find_map(|f| match &f.node {
        ProjectionNode::Scalar { expr, .. } => Some(expr),
        _ => None,
    })
}

/// Builds the `ON` condition correlating a child alias's FK column to
/// the parent alias's key column (shared by the LATERAL and temp-table
/// strategies' `FROM`-clause joins).
pub(crate) fn correlation_condition(parent_alias: &str, parent_key_col: &str, child_alias: &str, child_key_col: &str) -> Condition {
    Condition::Eq(
        Expr::Column {
            alias: child_alias.to_string(),
            column: child_key_col.to_string(),
        },
        Some(Expr::Column {
            alias: parent_alias.to_string(),
            column: parent_key_col.to_string(),
        }),
    )
}

/// Wraps `sql` (a bare `SELECT ...` statement, not yet parenthesized) as a
/// `LEFT JOIN LATERAL (...)` clause.
pub(crate) fn left_join_lateral(alias: String, sql: String, condition: Condition) -> JoinClause {
    JoinClause {
        kind: JoinKind::Left,
        target: JoinTarget::Raw {
            sql: format!("({})", sql),
            lateral: true,
        },
        alias,
        condition,
    }
}

/// Joins directly against a physical table already materialized out of
/// band (the temp-table strategy's `tmp_*` tables) — no parens, no
/// `LATERAL`, just a plain named relation.
pub(crate) fn left_join_table(alias: String, table_name: String, condition: Condition) -> JoinClause {
    JoinClause {
        kind: JoinKind::Left,
        target: JoinTarget::Raw {
            sql: format!("\"{}\"", table_name),
            lateral: false,
        },
        alias,
        condition,
    }
}
