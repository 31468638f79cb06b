//! Expression & Condition Tree (spec.md §4.1).
//!
//! Immutable predicate/scalar expression nodes and their SQL emitters.
//! Grounded on `query_planner::logical_expr::LogicalExpr`: a closed enum
//! (tagged union) rather than a trait-object tree, because the node
//! shapes are fixed by this spec and a closed enum lets `emit` be
//! exhaustively matched instead of dynamically dispatched.

pub mod errors;

use crate::value::AppValue;
use errors::ExpressionError;

/// Running emission state: the next `$n` parameter index and the
/// parameter vector it feeds. Shared by every node in a tree during one
/// emission pass (spec.md §4.1 contract: "every node exposes a single
/// operation — `emit(ctx)`").
#[derive(Debug, Default)]
pub struct EmitCtx {
    pub params: Vec<AppValue>,
}

impl EmitCtx {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Reserve the next placeholder for `value`, returning `$n`.
    pub fn bind(&mut self, value: AppValue) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }
}

/// A scalar expression: columns, constants, aggregates, raw fragments,
/// nested subqueries.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column reference, already resolved to `"alias"."column"` by the
    /// join planner (spec.md §4.4) before the expression tree ever sees it.
    Column { alias: String, column: String },
    /// An unresolved, root-anchored dotted navigation path (spec.md §4.2
    /// `prop_path`, e.g. `"user.name"`). Builder-facing code is allowed to
    /// construct trees with these; the emitter runs every plan through the
    /// Navigation Join Planner first, which rewrites every `Path` into a
    /// `Column` and folds the joins it needed into the plan (spec.md §4.4).
    /// `emit` on a tree that still contains one is a caller error — it
    /// means the resolution pass was skipped, not that the path is invalid.
    Path(String),
    Constant(AppValue),
    /// A raw SQL fragment with embedded captured expressions, substituted
    /// left-to-right in emission order (spec.md §4.1).
    Raw {
        template: String,
        captured: Vec<Expr>,
    },
    Aggregate {
        func: AggregateFn,
        arg: Box<Expr>,
        distinct: bool,
    },
    /// A correlated or uncorrelated scalar subquery, pre-rendered to SQL
    /// text by the emitter (spec.md §4.7) and injected here for predicates
    /// like `exists(subquery)`.
    Subquery(String),
    List(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFn {
    fn sql_name(self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Avg => "avg",
        }
    }
}

impl Expr {
    /// A dotted navigation path, resolved to a real column by the Join
    /// Planner before emission (spec.md §4.2/§4.4).
    pub fn path(path: impl Into<String>) -> Expr {
        Expr::Path(path.into())
    }

    pub fn emit(&self, ctx: &mut EmitCtx) -> Result<String, ExpressionError> {
        match self {
            Expr::Column { alias, column } => Ok(format!("\"{}\".\"{}\"", alias, column)),
            Expr::Path(path) => Err(ExpressionError::UnresolvedPath(path.clone())),
            Expr::Constant(v) => Ok(ctx.bind(v.clone())),
            Expr::Raw { template, captured } => emit_raw(template, captured, ctx),
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                let inner = arg.emit(ctx)?;
                let distinct_kw = if *distinct { "DISTINCT " } else { "" };
                Ok(format!("{}({}{})", func.sql_name(), distinct_kw, inner))
            }
            Expr::Subquery(sql) => Ok(format!("({})", sql)),
            Expr::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(item.emit(ctx)?);
                }
                Ok(format!("({})", parts.join(", ")))
            }
        }
    }
}

/// Substitutes each `{}` placeholder in `template`, left to right, with
/// the emitted form of the corresponding captured expression, preserving
/// parameter ordering (spec.md §4.1 raw-fragment semantics).
fn emit_raw(template: &str, captured: &[Expr], ctx: &mut EmitCtx) -> Result<String, ExpressionError> {
    let placeholders = template.matches("{}").count();
    if placeholders != captured.len() {
        return Err(ExpressionError::RawArityMismatch {
            placeholders,
            captured: captured.len(),
        });
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    for expr in captured {
        let Some(idx) = rest.find("{}") else {
            unreachable!("placeholder count already checked");
        };
        out.push_str(&rest[..idx]);
        out.push_str(&expr.emit(ctx)?);
        rest = &rest[idx + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Comparison/logical/null/pattern/set-membership/subquery predicates
/// (spec.md §4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Expr, Option<Expr>),
    Ne(Expr, Option<Expr>),
    Gt(Expr, Expr),
    Gte(Expr, Expr),
    Lt(Expr, Expr),
    Lte(Expr, Expr),
    Like(Expr, Expr),
    Between(Expr, Expr, Expr),
    InArray(Expr, Vec<Expr>),
    InSubquery(Expr, String),
    IsNull(Expr),
    IsNotNull(Expr),
    Exists(String),
    NotExists(String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Raw {
        template: String,
        captured: Vec<Expr>,
    },
}

impl Condition {
    pub fn emit(&self, ctx: &mut EmitCtx) -> Result<String, ExpressionError> {
        match self {
            Condition::Eq(lhs, rhs) => emit_null_aware(lhs, rhs, "=", "IS NULL", ctx),
            Condition::Ne(lhs, rhs) => emit_null_aware(lhs, rhs, "<>", "IS NOT NULL", ctx),
            Condition::Gt(lhs, rhs) => emit_binary(lhs, rhs, ">", "gt", ctx),
            Condition::Gte(lhs, rhs) => emit_binary(lhs, rhs, ">=", "gte", ctx),
            Condition::Lt(lhs, rhs) => emit_binary(lhs, rhs, "<", "lt", ctx),
            Condition::Lte(lhs, rhs) => emit_binary(lhs, rhs, "<=", "lte", ctx),
            Condition::Like(lhs, rhs) => emit_binary(lhs, rhs, "LIKE", "like", ctx),
            Condition::Between(col, lo, hi) => {
                let c = col.emit(ctx)?;
                let l = lo.emit(ctx)?;
                let h = hi.emit(ctx)?;
                Ok(format!("{} BETWEEN {} AND {}", c, l, h))
            }
            Condition::InArray(col, items) => {
                if items.is_empty() {
                    // spec.md §4.1: `in_array([])` is always-false, never `IN ()`.
                    return Ok("1=0".to_string());
                }
                let c = col.emit(ctx)?;
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(item.emit(ctx)?);
                }
                Ok(format!("{} IN ({})", c, parts.join(", ")))
            }
            Condition::InSubquery(col, sql) => {
                let c = col.emit(ctx)?;
                Ok(format!("{} IN ({})", c, sql))
            }
            Condition::IsNull(e) => Ok(format!("{} IS NULL", e.emit(ctx)?)),
            Condition::IsNotNull(e) => Ok(format!("{} IS NOT NULL", e.emit(ctx)?)),
            Condition::Exists(sql) => Ok(format!("EXISTS ({})", sql)),
            Condition::NotExists(sql) => Ok(format!("NOT EXISTS ({})", sql)),
            Condition::And(items) => emit_conjunction(items, "AND", ctx),
            Condition::Or(items) => emit_conjunction(items, "OR", ctx),
            Condition::Not(inner) => Ok(format!("NOT ({})", inner.emit(ctx)?)),
            Condition::Raw { template, captured } => {
                // Conditions reuse the same left-to-right substitution rule as Expr::Raw.
                let as_expr = Expr::Raw {
                    template: template.clone(),
                    captured: captured.clone(),
                };
                as_expr.emit(ctx)
            }
        }
    }

    pub fn and(conditions: Vec<Condition>) -> Condition {
        Condition::And(conditions)
    }

    pub fn or(conditions: Vec<Condition>) -> Condition {
        Condition::Or(conditions)
    }
}

/// `eq`/`ne` with a null or absent (`None`) right-hand side become
/// `IS [NOT] NULL`; otherwise a normal parameterized comparison
/// (spec.md §4.1, §8 "Null comparisons").
fn emit_null_aware(
    lhs: &Expr,
    rhs: &Option<Expr>,
    op: &str,
    null_form: &str,
    ctx: &mut EmitCtx,
) -> Result<String, ExpressionError> {
    match rhs {
        None => Ok(format!("{} {}", lhs.emit(ctx)?, null_form)),
        Some(Expr::Constant(AppValue::Null)) => Ok(format!("{} {}", lhs.emit(ctx)?, null_form)),
        Some(rhs) => {
            let l = lhs.emit(ctx)?;
            let r = rhs.emit(ctx)?;
            Ok(format!("{} {} {}", l, op, r))
        }
    }
}

/// Any other relational operator with a null/absent right-hand side is a
/// synchronous `InvalidCondition` failure (spec.md §4.1) — it must not
/// silently emit incomplete SQL, so this returns `Result` instead of
/// `String`. Callers needing a non-failing `Expr`/`Expr` pair should
/// check for null before reaching here.
fn emit_binary(
    lhs: &Expr,
    rhs: &Expr,
    op: &str,
    name: &str,
    ctx: &mut EmitCtx,
) -> Result<String, ExpressionError> {
    if matches!(rhs, Expr::Constant(AppValue::Null)) {
        return Err(ExpressionError::NullComparisonOperator {
            operator: name.to_string(),
        });
    }
    let l = lhs.emit(ctx)?;
    let r = rhs.emit(ctx)?;
    Ok(format!("{} {} {}", l, op, r))
}

fn emit_conjunction(
    items: &[Condition],
    joiner: &str,
    ctx: &mut EmitCtx,
) -> Result<String, ExpressionError> {
    if items.is_empty() {
        return Ok("1=1".to_string());
    }
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(format!("({})", item.emit(ctx)?));
    }
    Ok(parts.join(&format!(" {} ", joiner)))
}
