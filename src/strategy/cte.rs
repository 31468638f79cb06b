//! CTE/JSONB collection strategy (spec.md §4.5).
//!
//! One synthetic `WITH` entry per collection field: the child rows,
//! grouped by the correlation key and folded into a `json_agg` array,
//! then `LEFT JOIN`ed back onto the outer query by that same key.
//! Grounded on `render_plan::cte_manager::CteManager::build_collection_cte`.

use crate::builder::plan::{JoinClause, JoinKind, JoinTarget, Plan};
use crate::builder::projection::CollectionTerminal;
use crate::expr::{EmitCtx, Expr};
use crate::schema::SchemaRegistry;

use super::{correlation_columns, correlation_condition, wrap_terminal, RenderedCollection};
use super::errors::StrategyError;

const ITEMS_ALIAS: &str = "items";
const CORRELATION_ALIAS: &str = "__corr_key";

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

    let corr_expr = Expr::Column {
        alias: child_alias.clone(),
        column: child_key_col,
    };
    let inner_sql = crate::emit::emit_row_select(child, registry, ctx, Some((CORRELATION_ALIAS, corr_expr)))
        .map_err(Box::new)?;

    let cte_name = format!("{}__{}__cte", parent_alias, field_name);
    let cte_body = crate::cte::synthesize_aggregation_cte_body(&inner_sql, CORRELATION_ALIAS, ITEMS_ALIAS);

    let join_alias = format!("{}_j", cte_name);
    let join = JoinClause {
        kind: JoinKind::Left,
        target: JoinTarget::Cte { name: cte_name.clone() },
        alias: join_alias.clone(),
        condition: correlation_condition(parent_alias, &parent_key_col, &join_alias, CORRELATION_ALIAS),
    };

    let select_expr = wrap_terminal(terminal, &format!("\"{}\".\"{}\"", join_alias, ITEMS_ALIAS));

    Ok(RenderedCollection {
        select_expr,
        extra_ctes: vec![(cte_name, cte_body)],
        extra_joins: vec![join],
    })
}
