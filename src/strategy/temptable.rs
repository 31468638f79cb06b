//! TempTable collection strategy (spec.md §4.5).
//!
//! Unlike the CTE and LATERAL strategies, a temp table's aggregated rows
//! don't exist yet when the outer `SELECT` is emitted — they need a
//! separate `CREATE TEMP TABLE ... AS SELECT` statement run first, on the
//! same connection, before the outer query can join against it. This
//! module therefore splits in two: `build_execution_plan` produces the
//! out-of-band DDL/DML text an executor runs ahead of time (grounded on
//! `render_plan::cte_manager`'s aggregation-CTE body, reused here as the
//! body of a materialized table instead of a `WITH` entry), and
//! `render_inline` produces the same `RenderedCollection` shape the other
//! two strategies do, assuming that table already exists.

use crate::builder::projection::CollectionTerminal;
use crate::expr::{EmitCtx, Expr};
use crate::schema::SchemaRegistry;

use super::errors::StrategyError;
use super::{correlation_columns, correlation_condition, left_join_table, wrap_terminal, RenderedCollection};
use crate::builder::plan::Plan;

const ITEMS_ALIAS: &str = "items";
const CORRELATION_ALIAS: &str = "__corr_key";

/// The DDL/DML an executor must run, on the same connection the outer
/// query will later run on, before `render_inline` can join against
/// `table_name` (spec.md §6 "the temp-table strategy spans more than one
/// statement"). `ON COMMIT DROP` cleans the table up when the caller runs
/// inside a transaction scope (spec.md §4.9); `drop_sql` is the fallback
/// for callers executing outside one.
pub struct TempTableExecutionPlan {
    pub table_name: String,
    pub create_and_populate_sql: String,
    pub drop_sql: String,
}

/// Builds the out-of-band statement that materializes one collection
/// field's aggregated rows into `"<parent_alias>__<field_name>__tmp"`.
/// Callers needing the temp-table strategy run this (via
/// `Connection::query`) immediately before emitting the outer plan that
/// calls `render_inline` for the same field.
pub fn build_execution_plan(
    registry: &SchemaRegistry,
    parent_entity: &str,
    parent_alias: &str,
    field_name: &str,
    navigation: &str,
    child: &Plan,
    ctx: &mut EmitCtx,
) -> Result<TempTableExecutionPlan, StrategyError> {
    let (_target, _parent_key_col, child_key_col) = correlation_columns(registry, parent_entity, navigation)?;
    let child_alias = child.root_alias.clone();

    let corr_expr = Expr::Column {
        alias: child_alias,
        column: child_key_col,
    };
    let inner_sql = crate::emit::emit_row_select(child, registry, ctx, Some((CORRELATION_ALIAS, corr_expr)))
        .map_err(Box::new)?;

    let table_name = temp_table_name(parent_alias, field_name);
    let select_sql = crate::cte::synthesize_aggregation_cte_body(&inner_sql, CORRELATION_ALIAS, ITEMS_ALIAS);

    Ok(TempTableExecutionPlan {
        table_name: table_name.clone(),
        create_and_populate_sql: format!(
            "CREATE TEMP TABLE \"{table}\" ON COMMIT DROP AS {select}",
            table = table_name,
            select = select_sql,
        ),
        drop_sql: format!("DROP TABLE IF EXISTS \"{}\"", table_name),
    })
}

/// Joins the outer query against a temp table already populated by
/// `build_execution_plan`'s statement. No `extra_ctes`/`LATERAL` here —
/// just a plain named relation join, since the aggregation already ran.
pub fn render_inline(
    registry: &SchemaRegistry,
    parent_entity: &str,
    parent_alias: &str,
    field_name: &str,
    navigation: &str,
    _child: &Plan,
    terminal: &CollectionTerminal,
    _ctx: &mut EmitCtx,
) -> Result<RenderedCollection, StrategyError> {
    let (_target, parent_key_col, _child_key_col) = correlation_columns(registry, parent_entity, navigation)?;

    let table_name = temp_table_name(parent_alias, field_name);
    let join_alias = format!("{}_j", table_name);
    let join = left_join_table(
        join_alias.clone(),
        table_name,
        correlation_condition(parent_alias, &parent_key_col, &join_alias, CORRELATION_ALIAS),
    );

    let select_expr = wrap_terminal(terminal, &format!("\"{}\".\"{}\"", join_alias, ITEMS_ALIAS));

    Ok(RenderedCollection {
        select_expr,
        extra_ctes: Vec::new(),
        extra_joins: vec![join],
    })
}

fn temp_table_name(parent_alias: &str, field_name: &str) -> String {
    format!("{}__{}__tmp", parent_alias, field_name)
}
