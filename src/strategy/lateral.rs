//! LATERAL collection strategy (spec.md §4.5).
//!
//! The only strategy that honors a per-parent `LIMIT`/`OFFSET` (spec.md
//! §9 Open Question): the child plan's own ordering/limit/offset already
//! shape the `LATERAL`-correlated derived table before anything is
//! aggregated, so "top N children per parent" falls out for free.
//! Grounded on `render_plan::cte_manager`'s subquery-correlation pattern,
//! adapted from a `WITH`-registered CTE to an inline `LATERAL` join.

use crate::builder::projection::CollectionTerminal;
use crate::expr::{Condition, EmitCtx};
use crate::schema::SchemaRegistry;

use super::errors::StrategyError;
use super::{correlation_columns, correlation_condition, left_join_lateral, scalar_aggregate_sql, wrap_terminal, RenderedCollection};
use crate::builder::plan::Plan;

pub fn render(
    registry: &SchemaRegistry,
    parent_entity: &str,
    parent_alias: &str,
    field_name: &str,
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

    let lateral_alias = format!("{}__{}__lat", parent_alias, field_name);

    if terminal.is_simple_scalar_aggregate() {
        // Reached only when the caller asked for a per-parent limit/offset
        // on an otherwise-inline terminal (the general dispatch in
        // `strategy::render_collection_field` already handles the
        // no-limit case without ever reaching a per-strategy renderer).
        let select_expr = scalar_aggregate_sql(&correlated, registry, terminal, ctx)?;
        return Ok(RenderedCollection {
            select_expr,
            extra_ctes: Vec::new(),
            extra_joins: Vec::new(),
        });
    }

    let inner_sql = crate::emit::emit_row_select(&correlated, registry, ctx, None).map_err(Box::new)?;
    let lateral_sql = format!(
        "SELECT COALESCE(json_agg(to_jsonb(t.*)), '[]'::jsonb) AS \"items\" FROM ({}) t",
        inner_sql
    );

    let join = left_join_lateral(
        lateral_alias.clone(),
        lateral_sql,
        Condition::Raw {
            template: "TRUE".to_string(),
            captured: vec![],
        },
    );

    let select_expr = wrap_terminal(terminal, &format!("\"{}\".\"items\"", lateral_alias));

    Ok(RenderedCollection {
        select_expr,
        extra_ctes: Vec::new(),
        extra_joins: vec![join],
    })
}
