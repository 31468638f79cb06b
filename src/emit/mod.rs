//! SQL Emitter (spec.md §4.7).
//!
//! Walks a `Plan`, resolves every `Expr::Path` through the Navigation
//! Join Planner, and renders `SELECT`/`INSERT`/`UPDATE`/`DELETE` text
//! against one shared `EmitCtx` parameter stream. Grounded on
//! `render_plan::sql_renderer`'s clause-assembly order (`WITH` / `SELECT`
//! / `FROM` / `WHERE` / `GROUP BY` / `HAVING` / `ORDER BY` / `LIMIT` /
//! `OFFSET`) and `exograph::transform::pg::select::SelectTransformer`'s
//! split between a "resolve" pass and a "render" pass.

pub mod errors;

use crate::builder::plan::{Direction, InsertPlan, JoinClause, JoinKind, JoinTarget, Plan, PlanVariant, UpdatePlan, DeletePlan};
use crate::builder::projection::{ProjectedField, ProjectionNode};
use crate::expr::{Condition, EmitCtx, Expr};
use crate::planner::JoinScope;
use crate::schema::SchemaRegistry;
use crate::value::AppValue;
use errors::EmitError;

/// Top-level dispatch: one `Plan`, any variant, rendered as one SQL
/// statement sharing `ctx`'s parameter stream (spec.md §4.1 "parameter
/// consistency": every nested CTE and collection subquery numbers off
/// the same counter).
pub fn emit_plan(plan: &Plan, registry: &SchemaRegistry, ctx: &mut EmitCtx) -> Result<String, EmitError> {
    match &plan.variant {
        PlanVariant::Entity => {
            let projection = default_full_projection(plan, registry)?;
            emit_select_body(plan, registry, &projection, None, ctx, None)
        }
        PlanVariant::Select { projection } => emit_select_body(plan, registry, projection, None, ctx, None),
        PlanVariant::Grouped {
            group_keys,
            having,
            projection,
        } => emit_select_body(plan, registry, projection, Some((group_keys, having)), ctx, None),
        PlanVariant::Insert(insert) => emit_insert(insert, registry, ctx),
        PlanVariant::Update(update) => emit_update(update, registry, ctx),
        PlanVariant::Delete(delete) => emit_delete(delete, registry, ctx),
    }
}

/// Renders `plan` as a flat row-producing `SELECT` — no outer
/// `json_agg`/aggregate wrapping. Used by the Collection Strategy Engine
/// to get "one row per child entity" SQL it then folds into a CTE, a
/// `LATERAL` join, or a temp table (spec.md §4.5). `extra_leading_column`
/// injects a column ahead of the declared projection — the correlation
/// key the strategy needs but which isn't itself a projected field.
pub fn emit_row_select(
    plan: &Plan,
    registry: &SchemaRegistry,
    ctx: &mut EmitCtx,
    extra_leading_column: Option<(&str, Expr)>,
) -> Result<String, EmitError> {
    let projection = match plan.projection() {
        Some(p) => p.to_vec(),
        None => default_full_projection(plan, registry)?,
    };
    let grouped = match &plan.variant {
        PlanVariant::Grouped { group_keys, having, .. } => Some((group_keys.as_slice(), having.as_slice())),
        _ => None,
    };
    emit_select_body(plan, registry, &projection, grouped, ctx, extra_leading_column)
}

/// Re-derives the fully path-resolved projection tree (mappers attached,
/// every `Expr::Path` rewritten to `Expr::Column`) for a top-level
/// Entity/Select/Grouped plan, without re-emitting any SQL text. The Row
/// Materializer (`src/materialize/`) needs this same tree `emit_plan`
/// built internally — not the raw caller-declared one — to know which
/// mapper applies to which decoded column (spec.md §4.8 rule 4).
///
/// This recomputes rather than threads state out of `emit_select_body`
/// because resolution is a pure function of `(plan, registry)` (spec.md
/// §8 "Determinism": two independent emissions of the same plan yield
/// identical SQL and, by the same argument, identical resolved
/// projections) — cheaper to call twice than to carry an out-parameter
/// through every recursive `emit_plan`/`emit_row_select` call site that
/// doesn't need it.
pub fn resolve_projection_for_decode(
    plan: &Plan,
    registry: &SchemaRegistry,
) -> Result<Vec<ProjectedField>, EmitError> {
    let projection = match plan.projection() {
        Some(p) => p.to_vec(),
        None => default_full_projection(plan, registry)?,
    };
    let mut scope = JoinScope::new(plan.root_entity.clone(), plan.root_alias.clone());
    Ok(projection
        .iter()
        .map(|f| scope.resolve_projected_field(registry, f))
        .collect::<Result<Vec<_>, crate::planner::errors::JoinPlanError>>()?)
}

/// Every declared, non-navigation property of the root entity, in
/// declaration order — the implicit projection of a bare `EntityBuilder`
/// plan that never called `select()` (spec.md §4.3).
fn default_full_projection(plan: &Plan, registry: &SchemaRegistry) -> Result<Vec<ProjectedField>, EmitError> {
    let root = registry.get(&plan.root_entity)?;
    Ok(root
        .properties
        .iter()
        .map(|p| {
            let col = Expr::Column {
                alias: plan.root_alias.clone(),
                column: p.column_name.clone(),
            };
            match &p.value_mapper {
                Some(mapper) => ProjectedField::scalar_mapped(p.property_name.clone(), col, mapper.clone()),
                None => ProjectedField::scalar(p.property_name.clone(), col),
            }
        })
        .collect())
}

fn join_keyword(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
    }
}

fn direction_keyword(direction: Direction) -> &'static str {
    match direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_select_body(
    plan: &Plan,
    registry: &SchemaRegistry,
    projection: &[ProjectedField],
    grouped: Option<(&[(String, Expr)], &[Condition])>,
    ctx: &mut EmitCtx,
    extra_leading_column: Option<(&str, Expr)>,
) -> Result<String, EmitError> {
    let root = registry.get(&plan.root_entity)?;
    let mut scope = JoinScope::new(plan.root_entity.clone(), plan.root_alias.clone());

    // --- resolve pass: every `Expr::Path` anywhere in the plan becomes a
    // resolved `Expr::Column`, and the joins it needed land in `scope`.
    let resolved_extra_leading = match extra_leading_column {
        Some((alias, expr)) => Some((alias.to_string(), scope.resolve_expr(registry, &expr)?)),
        None => None,
    };
    let resolved_filters = plan
        .filters
        .iter()
        .map(|c| scope.resolve_condition(registry, c))
        .collect::<Result<Vec<_>, _>>()?;
    let resolved_order_by = plan
        .order_by
        .iter()
        .map(|(e, d)| Ok::<_, EmitError>((scope.resolve_expr(registry, e)?, *d)))
        .collect::<Result<Vec<_>, _>>()?;
    let resolved_projection = projection
        .iter()
        .map(|f| scope.resolve_projected_field(registry, f))
        .collect::<Result<Vec<_>, crate::planner::errors::JoinPlanError>>()?;
    let (resolved_group_keys, resolved_having) = match grouped {
        Some((keys, having)) => {
            let keys = keys
                .iter()
                .map(|(name, e)| Ok::<_, EmitError>((name.clone(), scope.resolve_expr(registry, e)?)))
                .collect::<Result<Vec<_>, _>>()?;
            let having = having
                .iter()
                .map(|c| scope.resolve_condition(registry, c))
                .collect::<Result<Vec<_>, _>>()?;
            (keys, having)
        }
        None => (Vec::new(), Vec::new()),
    };

    // Collection fields build and resolve their own child plan independently
    // (spec.md §4.4 alias isolation) — they don't touch `scope`.
    let mut strategy_ctes: Vec<(String, String)> = Vec::new();
    let mut strategy_joins: Vec<JoinClause> = Vec::new();
    let strategy = plan.query_options.map(|o| o.collection_strategy).unwrap_or_default();
    let mut select_items = Vec::new();

    if let Some((alias, expr)) = &resolved_extra_leading {
        select_items.push(format!("{} AS \"{}\"", expr.emit(ctx)?, alias));
    }
    for (alias_path, expr, _mapper) in ProjectedField::collect_scalar_aliases(&resolved_projection, "") {
        select_items.push(format!("{} AS \"{}\"", expr.emit(ctx)?, alias_path));
    }
    for (alias_path, field) in ProjectedField::collection_fields(&resolved_projection, "") {
        if let ProjectionNode::Collection { child, navigation, terminal } = &field.node {
            let rendered = crate::strategy::render_collection_field(
                strategy,
                registry,
                &plan.root_entity,
                &plan.root_alias,
                &alias_path,
                navigation,
                child,
                terminal,
                ctx,
            )?;
            select_items.push(format!("{} AS \"{}\"", rendered.select_expr, alias_path));
            strategy_ctes.extend(rendered.extra_ctes);
            strategy_joins.extend(rendered.extra_joins);
        }
    }

    let resolved_joins = scope.into_joins();

    // --- render pass ---
    let mut sql = String::new();

    if !plan.ctes.is_empty() || !strategy_ctes.is_empty() {
        let mut parts = Vec::new();
        if !plan.ctes.is_empty() {
            parts.push(crate::cte::render_named_ctes(&plan.ctes, registry, ctx)?);
        }
        for (name, body) in &strategy_ctes {
            parts.push(format!("\"{}\" AS ({})", name, body));
        }
        sql.push_str("WITH ");
        sql.push_str(&parts.join(", "));
        sql.push(' ');
    }

    sql.push_str("SELECT ");
    if plan.is_distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&select_items.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&root.qualified_table());
    sql.push_str(" AS \"");
    sql.push_str(&plan.root_alias);
    sql.push('"');

    for rj in &resolved_joins {
        let target = registry.get(&rj.entity)?;
        sql.push(' ');
        sql.push_str(join_keyword(rj.kind));
        sql.push(' ');
        sql.push_str(&target.qualified_table());
        sql.push_str(" AS \"");
        sql.push_str(&rj.alias);
        sql.push_str("\" ON ");
        sql.push_str(&rj.condition.emit(ctx)?);
    }

    for join in plan.joins.iter().chain(strategy_joins.iter()) {
        let target_sql = match &join.target {
            JoinTarget::Table { entity } => registry.get(entity)?.qualified_table(),
            JoinTarget::Cte { name } => format!("\"{}\"", name),
            JoinTarget::Subquery { plan: sub, lateral } => {
                let inner = emit_plan(sub, registry, ctx)?;
                if *lateral {
                    format!("LATERAL ({})", inner)
                } else {
                    format!("({})", inner)
                }
            }
            JoinTarget::Raw { sql, lateral } => {
                if *lateral {
                    format!("LATERAL {}", sql)
                } else {
                    sql.clone()
                }
            }
        };
        sql.push(' ');
        sql.push_str(join_keyword(join.kind));
        sql.push(' ');
        sql.push_str(&target_sql);
        sql.push_str(" AS \"");
        sql.push_str(&join.alias);
        sql.push_str("\" ON ");
        sql.push_str(&join.condition.emit(ctx)?);
    }

    if !resolved_filters.is_empty() {
        let mut parts = Vec::with_capacity(resolved_filters.len());
        for f in &resolved_filters {
            parts.push(f.emit(ctx)?);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&parts.join(" AND "));
    }

    if !resolved_group_keys.is_empty() {
        let mut parts = Vec::with_capacity(resolved_group_keys.len());
        for (_, e) in &resolved_group_keys {
            parts.push(e.emit(ctx)?);
        }
        sql.push_str(" GROUP BY ");
        sql.push_str(&parts.join(", "));
    }

    if !resolved_having.is_empty() {
        let mut parts = Vec::with_capacity(resolved_having.len());
        for h in &resolved_having {
            parts.push(h.emit(ctx)?);
        }
        sql.push_str(" HAVING ");
        sql.push_str(&parts.join(" AND "));
    }

    if !resolved_order_by.is_empty() {
        let mut parts = Vec::with_capacity(resolved_order_by.len());
        for (e, dir) in &resolved_order_by {
            parts.push(format!("{} {}", e.emit(ctx)?, direction_keyword(*dir)));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&parts.join(", "));
    }

    if let Some(limit) = plan.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = plan.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    Ok(sql)
}

/// A `RETURNING`/mutation target column has no table alias in scope
/// (Postgres mutation statements don't carry a `FROM`-clause alias for
/// their own target table) — only plain resolved `Expr::Column`s make
/// sense here, by construction of the builder surface (spec.md §4.7).
fn mutation_column_name(expr: &Expr) -> &str {
    match expr {
        Expr::Column { column, .. } => column,
        _ => "?column?",
    }
}

fn emit_returning(returning: &Option<Vec<ProjectedField>>, ctx: &mut EmitCtx) -> Result<String, EmitError> {
    match returning {
        None => Ok(String::new()),
        Some(fields) => {
            let cols = ProjectedField::collect_scalar_aliases(fields, "");
            let mut parts = Vec::with_capacity(cols.len());
            for (alias_path, expr, _mapper) in &cols {
                parts.push(format!("\"{}\" AS \"{}\"", mutation_column_name(expr), alias_path));
            }
            Ok(format!(" RETURNING {}", parts.join(", ")))
        }
    }
}

fn emit_insert(insert: &InsertPlan, registry: &SchemaRegistry, ctx: &mut EmitCtx) -> Result<String, EmitError> {
    let entity = registry.get(&insert.entity)?;
    let columns: Vec<String> = insert.rows[0].iter().map(|a| a.column.clone()).collect();

    let mut row_sql = Vec::with_capacity(insert.rows.len());
    for row in &insert.rows {
        let by_col: std::collections::HashMap<&str, &Expr> =
            row.iter().map(|a| (a.column.as_str(), &a.value)).collect();
        let mut values = Vec::with_capacity(columns.len());
        for col in &columns {
            let value = by_col
                .get(col.as_str())
                .expect("bulk insert rows were validated to share one column set before building the plan");
            values.push(value.emit(ctx)?);
        }
        row_sql.push(format!("({})", values.join(", ")));
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        entity.qualified_table(),
        columns.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", "),
        row_sql.join(", "),
    );

    if let Some(conflict) = &insert.conflict {
        sql.push_str(" ON CONFLICT (");
        sql.push_str(
            &conflict
                .target_columns
                .iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", "),
        );
        sql.push(')');
        if let Some(target_where) = &conflict.target_where {
            sql.push_str(" WHERE ");
            sql.push_str(&target_where.emit(ctx)?);
        }
        if conflict.set.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            sql.push_str(" DO UPDATE SET ");
            let mut parts = Vec::with_capacity(conflict.set.len());
            for assignment in &conflict.set {
                parts.push(format!("\"{}\" = {}", assignment.column, assignment.value.emit(ctx)?));
            }
            sql.push_str(&parts.join(", "));
            if let Some(set_where) = &conflict.set_where {
                sql.push_str(" WHERE ");
                sql.push_str(&set_where.emit(ctx)?);
            }
        }
    }

    sql.push_str(&emit_returning(&insert.returning, ctx)?);
    Ok(sql)
}

/// Splits a bulk insert into statement-sized chunks bound by the
/// driver's parameter ceiling (spec.md §4.7 "bulk insert chunks the
/// value list"). Each row contributes `columns_per_row` bound
/// parameters; the chunk size leaves headroom (a `0.6` load factor)
/// rather than chunking to the exact ceiling, the same margin
/// `pgorm`'s batch-insert helper reserves for planner/driver overhead
/// per statement. Each chunk is independent — its own `EmitCtx`, its own
/// `$1..$n` numbering — because they execute as separate statements.
pub fn emit_insert_chunks(
    insert: &InsertPlan,
    registry: &SchemaRegistry,
    max_statement_params: usize,
) -> Result<Vec<(String, Vec<AppValue>)>, EmitError> {
    if insert.rows.is_empty() {
        return Ok(Vec::new());
    }
    let columns_per_row = insert.rows[0].len().max(1);
    let rows_per_chunk = ((max_statement_params as f64 / columns_per_row as f64) * 0.6).floor() as usize;
    let rows_per_chunk = rows_per_chunk.max(1);

    if rows_per_chunk >= insert.rows.len() {
        let mut ctx = EmitCtx::new();
        let sql = emit_insert(insert, registry, &mut ctx)?;
        return Ok(vec![(sql, ctx.params)]);
    }

    if rows_per_chunk * columns_per_row > max_statement_params {
        return Err(EmitError::InsertRowExceedsParamCeiling {
            columns: columns_per_row,
            ceiling: max_statement_params,
        });
    }

    let mut out = Vec::new();
    for chunk in insert.rows.chunks(rows_per_chunk) {
        let chunk_plan = InsertPlan {
            entity: insert.entity.clone(),
            rows: chunk.to_vec(),
            returning: insert.returning.clone(),
            conflict: insert.conflict.clone(),
        };
        let mut ctx = EmitCtx::new();
        let sql = emit_insert(&chunk_plan, registry, &mut ctx)?;
        out.push((sql, ctx.params));
    }
    Ok(out)
}

fn emit_update(update: &UpdatePlan, registry: &SchemaRegistry, ctx: &mut EmitCtx) -> Result<String, EmitError> {
    let entity = registry.get(&update.entity)?;
    let mut scope = JoinScope::new(update.entity.clone(), update.alias.clone());

    let mut set_parts = Vec::with_capacity(update.assignments.len());
    for assignment in &update.assignments {
        let value = scope.resolve_expr(registry, &assignment.value)?;
        set_parts.push(format!("\"{}\" = {}", assignment.column, value.emit(ctx)?));
    }

    let filters = update
        .filters
        .iter()
        .map(|c| scope.resolve_condition(registry, c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut sql = format!(
        "UPDATE {} AS \"{}\" SET {}",
        entity.qualified_table(),
        update.alias,
        set_parts.join(", ")
    );

    if !filters.is_empty() {
        let mut parts = Vec::with_capacity(filters.len());
        for f in &filters {
            parts.push(f.emit(ctx)?);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&parts.join(" AND "));
    }

    sql.push_str(&emit_returning(&update.returning, ctx)?);
    Ok(sql)
}

fn emit_delete(delete: &DeletePlan, registry: &SchemaRegistry, ctx: &mut EmitCtx) -> Result<String, EmitError> {
    let entity = registry.get(&delete.entity)?;
    let mut scope = JoinScope::new(delete.entity.clone(), delete.alias.clone());

    let filters = delete
        .filters
        .iter()
        .map(|c| scope.resolve_condition(registry, c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut sql = format!("DELETE FROM {} AS \"{}\"", entity.qualified_table(), delete.alias);

    if !filters.is_empty() {
        let mut parts = Vec::with_capacity(filters.len());
        for f in &filters {
            parts.push(f.emit(ctx)?);
        }
        sql.push_str(" WHERE ");
        sql.push_str(&parts.join(" AND "));
    }

    sql.push_str(&emit_returning(&delete.returning, ctx)?);
    Ok(sql)
}
