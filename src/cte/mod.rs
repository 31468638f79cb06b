//! CTE Composer (spec.md §4.6).
//!
//! Composes multiple named CTEs so each one's parameters are numbered
//! consecutively across the final statement, and each CTE's internal
//! aliases stay independent. Parameter-offset bookkeeping comes for free
//! here: every CTE body and the main query share the same `EmitCtx`
//! (spec.md §4.1), so `$n` numbering is contiguous by construction —
//! the same guarantee `render_plan::cte_extraction::
//! collect_parameters_from_filters` provides by walking filters in a
//! fixed order before assigning offsets.

pub mod errors;

use std::collections::HashSet;

use crate::builder::plan::{NamedCte, Plan};
use crate::expr::{EmitCtx, Expr};
use crate::schema::SchemaRegistry;
use errors::CteError;

/// `with_cte(name, inner_plan)` (spec.md §4.6): render one registered
/// named CTE's body by recursively emitting its inner plan through the
/// shared `EmitCtx`.
pub fn render_named_ctes(
    ctes: &[NamedCte],
    registry: &SchemaRegistry,
    ctx: &mut EmitCtx,
) -> Result<String, CteError> {
    let mut seen = HashSet::new();
    let mut rendered = Vec::with_capacity(ctes.len());
    for cte in ctes {
        if !seen.insert(cte.name.clone()) {
            return Err(CteError::DuplicateName(cte.name.clone()));
        }
        let body = match &cte.aggregation {
            None => crate::emit::emit_plan(&cte.plan, registry, ctx).map_err(Box::new)?,
            Some(agg) => {
                let inner = crate::emit::emit_plan(&cte.plan, registry, ctx).map_err(Box::new)?;
                render_aggregation_body(&inner, &agg.group_keys, &agg.items_alias, ctx)
                    .map_err(Box::new)?
            }
        };
        rendered.push(format!("\"{}\" AS ({})", cte.name, body));
    }
    Ok(rendered.join(", "))
}

/// `with_aggregation(name, inner_plan, group_key_selector, items_alias)`
/// (spec.md §4.6): `SELECT <keys>, json_agg(to_jsonb(t.*)) AS
/// <items_alias> FROM (<inner>) t GROUP BY <keys>`.
pub fn render_aggregation_body(
    inner_sql: &str,
    group_keys: &[Expr],
    items_alias: &str,
    ctx: &mut EmitCtx,
) -> Result<String, crate::emit::errors::EmitError> {
    let mut key_sql = Vec::with_capacity(group_keys.len());
    for key in group_keys {
        key_sql.push(format!("t.{}", rewrite_to_t_alias(&key.emit(ctx)?)));
    }
    let keys_joined = key_sql.join(", ");
    Ok(format!(
        "SELECT {keys}, json_agg(to_jsonb(t.*)) AS \"{items}\" FROM ({inner}) t GROUP BY {keys}",
        keys = keys_joined,
        items = items_alias,
        inner = inner_sql,
    ))
}

/// A group key `Expr` emits as `"alias"."column"`; inside the wrapping
/// `SELECT ... FROM (...) t`, every column of `inner` is addressed
/// through the synthetic alias `t`, so rewrite the emitted fragment's
/// table-qualifier away and re-qualify with `t.`.
fn rewrite_to_t_alias(emitted: &str) -> String {
    match emitted.rsplit_once('.') {
        Some((_, column)) => column.to_string(),
        None => emitted.to_string(),
    }
}

/// CTE body synthesis used internally by the CTE collection strategy
/// (spec.md §4.5 CTE/JSONB strategy): one synthetic aggregation CTE body
/// per collection field, independent of any CTEs the caller registered
/// via `.with(...)`. The correlation column rides along in `inner_select_sql`
/// under `correlation_column`'s name so it can key the `GROUP BY`, then is
/// stripped back out of each aggregated row object — callers only see the
/// declared projection's columns in `items`.
pub fn synthesize_aggregation_cte_body(
    inner_select_sql: &str,
    correlation_column: &str,
    items_alias: &str,
) -> String {
    format!(
        "SELECT t.\"{corr}\", json_agg(to_jsonb(t.*) - '{corr}') AS \"{items}\" FROM ({inner}) t GROUP BY t.\"{corr}\"",
        corr = correlation_column,
        items = items_alias,
        inner = inner_select_sql,
    )
}
