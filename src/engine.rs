//! Query Engine: binds a `Driver` to the Schema Registry and wires the
//! SQL Emitter, Collection Strategy Engine, and Row Materializer into
//! the terminal operations (spec.md §2 "Control flow": `to_list`,
//! `first`, `count`, `exists`, `insert`, `update`, `delete`). Every
//! terminal follows the same lifecycle spec.md §3 describes: "acquire-
//! connection, emit, execute, materialize, release-connection."
//! Grounded on `clickgraph::server`'s request-scoped connection lifecycle
//! and `pgorm`'s pool-bound execution entry points.

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio_postgres::types::ToSql;

use crate::builder::plan::{InsertPlan, Plan, PlanVariant};
use crate::builder::projection::{ProjectedField, ProjectionNode};
use crate::config::{CollectionStrategy, EngineConfig, QueryOptions};
use crate::driver::{Connection, Driver, DriverError, QueryResult};
use crate::error::OrmError;
use crate::expr::EmitCtx;
use crate::materialize::{self, MaterializedValue};
use crate::schema::SchemaRegistry;
use crate::strategy::temptable;
use crate::txn::TransactionScope;
use crate::value::{AppValue, DriverValue};

/// A connection-like thing the engine can run parameterized SQL
/// against — either a freshly acquired `Connection` or a connection
/// already bound by an open `TransactionScope` (spec.md §4.9 "all
/// builders reachable through the scope route their terminal calls
/// through that bound connection"). The `_scoped` methods on
/// `QueryEngine` take the latter; every other terminal acquires its own.
#[async_trait]
pub trait SqlExecutor: Send {
    async fn execute(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<QueryResult, DriverError>;
}

#[async_trait]
impl SqlExecutor for dyn Connection + '_ {
    async fn execute(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<QueryResult, DriverError> {
        Connection::query(self, sql, params).await
    }
}

#[async_trait]
impl SqlExecutor for TransactionScope<'_> {
    async fn execute(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<QueryResult, DriverError> {
        self.query(sql, params).await
    }
}

/// Binds the compilation engine to one concrete `Driver` and one
/// `SchemaRegistry` (spec.md §3 "Entity descriptors ... live
/// process-wide"). Cheap to clone-share behind an `Arc`: every method
/// borrows `&self` only, so one instance serves arbitrarily many
/// concurrent terminal calls (spec.md §5 "the engine itself holds no
/// global locks").
pub struct QueryEngine<D> {
    driver: D,
    registry: SchemaRegistry,
    config: EngineConfig,
}

impl<D: Driver> QueryEngine<D> {
    pub fn new(driver: D, registry: SchemaRegistry, config: EngineConfig) -> Self {
        Self { driver, registry, config }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn effective_options(&self, plan: &Plan) -> QueryOptions {
        plan.query_options
            .unwrap_or_else(|| self.config.query_options.clone().into())
    }

    // --- auto-acquiring terminals -----------------------------------

    pub async fn to_list(&self, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let options = self.effective_options(plan);
        let mut conn = self.driver.acquire().await?;
        let outcome = self.run_select(conn.as_mut(), plan, options).await;
        conn.release().await;
        outcome
    }

    pub async fn first(&self, plan: &Plan) -> Result<Option<MaterializedValue>, OrmError> {
        let mut limited = plan.clone();
        limited.limit = Some(1);
        let mut rows = self.to_list(&limited).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    pub async fn count(&self, plan: &Plan) -> Result<i64, OrmError> {
        let mut conn = self.driver.acquire().await?;
        let outcome = self
            .run_root_aggregate(conn.as_mut(), plan, |inner| {
                format!("SELECT COALESCE((SELECT count(*) FROM ({}) t), 0) AS \"value\"", inner)
            })
            .await;
        conn.release().await;
        Ok(match outcome? {
            DriverValue::Int(i) => i,
            _ => 0,
        })
    }

    pub async fn exists(&self, plan: &Plan) -> Result<bool, OrmError> {
        let mut conn = self.driver.acquire().await?;
        let outcome = self
            .run_root_aggregate(conn.as_mut(), plan, |inner| {
                format!("SELECT EXISTS (SELECT 1 FROM ({}) t) AS \"value\"", inner)
            })
            .await;
        conn.release().await;
        Ok(matches!(outcome?, DriverValue::Bool(true)))
    }

    pub async fn insert(&self, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let insert_plan = expect_insert(plan);
        let chunks = crate::emit::emit_insert_chunks(insert_plan, &self.registry, self.config.max_statement_params)?;
        let mut conn = self.driver.acquire().await?;
        let outcome = self.run_insert_chunks(conn.as_mut(), insert_plan, chunks).await;
        conn.release().await;
        outcome
    }

    pub async fn update(&self, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let update_plan = expect_update(plan);
        let mut ctx = EmitCtx::new();
        let sql = crate::emit::emit_plan(plan, &self.registry, &mut ctx)?;
        let mut conn = self.driver.acquire().await?;
        let outcome = self
            .run_mutation(conn.as_mut(), &sql, ctx.params, update_plan.returning.as_ref())
            .await;
        conn.release().await;
        outcome
    }

    pub async fn delete(&self, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let delete_plan = expect_delete(plan);
        let mut ctx = EmitCtx::new();
        let sql = crate::emit::emit_plan(plan, &self.registry, &mut ctx)?;
        let mut conn = self.driver.acquire().await?;
        let outcome = self
            .run_mutation(conn.as_mut(), &sql, ctx.params, delete_plan.returning.as_ref())
            .await;
        conn.release().await;
        outcome
    }

    // --- transaction-scoped terminals --------------------------------
    //
    // Identical shapes, but routed through an already-bound
    // `TransactionScope` instead of acquiring/releasing a fresh
    // connection (spec.md §4.9). The caller owns the scope's lifetime
    // via `txn::run_in_transaction`.

    pub async fn to_list_scoped(&self, scope: &mut TransactionScope<'_>, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let options = self.effective_options(plan);
        self.run_select(scope, plan, options).await
    }

    pub async fn count_scoped(&self, scope: &mut TransactionScope<'_>, plan: &Plan) -> Result<i64, OrmError> {
        let value = self
            .run_root_aggregate(scope, plan, |inner| {
                format!("SELECT COALESCE((SELECT count(*) FROM ({}) t), 0) AS \"value\"", inner)
            })
            .await?;
        Ok(match value {
            DriverValue::Int(i) => i,
            _ => 0,
        })
    }

    pub async fn insert_scoped(&self, scope: &mut TransactionScope<'_>, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let insert_plan = expect_insert(plan);
        let chunks = crate::emit::emit_insert_chunks(insert_plan, &self.registry, self.config.max_statement_params)?;
        self.run_insert_chunks(scope, insert_plan, chunks).await
    }

    pub async fn update_scoped(&self, scope: &mut TransactionScope<'_>, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let update_plan = expect_update(plan);
        let mut ctx = EmitCtx::new();
        let sql = crate::emit::emit_plan(plan, &self.registry, &mut ctx)?;
        self.run_mutation(scope, &sql, ctx.params, update_plan.returning.as_ref()).await
    }

    pub async fn delete_scoped(&self, scope: &mut TransactionScope<'_>, plan: &Plan) -> Result<Vec<MaterializedValue>, OrmError> {
        let delete_plan = expect_delete(plan);
        let mut ctx = EmitCtx::new();
        let sql = crate::emit::emit_plan(plan, &self.registry, &mut ctx)?;
        self.run_mutation(scope, &sql, ctx.params, delete_plan.returning.as_ref()).await
    }

    // --- shared execution plumbing -----------------------------------

    async fn run_select<E: SqlExecutor + ?Sized>(
        &self,
        exec: &mut E,
        plan: &Plan,
        options: QueryOptions,
    ) -> Result<Vec<MaterializedValue>, OrmError> {
        let mut scoped_plan = plan.clone();
        scoped_plan.query_options = Some(options);

        let drops = self.populate_temp_tables(exec, &scoped_plan, options.collection_strategy).await?;

        let mut ctx = EmitCtx::new();
        let sql_result = crate::emit::emit_plan(&scoped_plan, &self.registry, &mut ctx);

        let result = match sql_result {
            Ok(sql) => {
                let params = std::mem::take(&mut ctx.params);
                self.execute_and_decode(exec, &scoped_plan, &sql, params, options).await
            }
            Err(err) => Err(OrmError::from(err)),
        };

        for drop_sql in &drops {
            if let Err(err) = exec.execute(drop_sql, &[]).await {
                warn!("failed to drop temp table during cleanup: {}", err);
            }
        }

        result
    }

    async fn execute_and_decode<E: SqlExecutor + ?Sized>(
        &self,
        exec: &mut E,
        plan: &Plan,
        sql: &str,
        params: Vec<AppValue>,
        options: QueryOptions,
    ) -> Result<Vec<MaterializedValue>, OrmError> {
        if options.log_queries {
            debug!("relorm: {}", sql);
        }
        if options.log_parameters {
            trace!("relorm: params = {:?}", params);
        }
        let resolved_projection = crate::emit::resolve_projection_for_decode(plan, &self.registry)?;
        let bound = bind_params(params);
        let refs = as_sql_refs(&bound);
        let result = exec.execute(sql, &refs).await?;
        Ok(materialize::decode_rows(&result.rows, &resolved_projection, &self.registry)?)
    }

    /// Runs the out-of-band `CREATE TEMP TABLE ... AS` statement for
    /// every top-level collection field the temp-table strategy applies
    /// to (spec.md §4.5 "three logical steps"), skipping the inline
    /// scalar-aggregate shortcut fields that never need one (spec.md §9
    /// Open Question). On any failure mid-sequence, compensates by
    /// dropping whatever was already created before propagating the
    /// error (spec.md §5 "Cancellation mid-multistatement ... must run
    /// compensating DROP TABLE IF EXISTS").
    async fn populate_temp_tables<E: SqlExecutor + ?Sized>(
        &self,
        exec: &mut E,
        plan: &Plan,
        strategy: CollectionStrategy,
    ) -> Result<Vec<String>, OrmError> {
        if strategy != CollectionStrategy::TempTable {
            return Ok(Vec::new());
        }
        let Some(projection) = plan.projection() else {
            return Ok(Vec::new());
        };

        let mut drops = Vec::new();
        for (alias_path, field) in ProjectedField::collection_fields(projection, "") {
            let ProjectionNode::Collection { child, navigation, terminal } = &field.node else {
                continue;
            };
            if terminal.is_simple_scalar_aggregate() && child.limit.is_none() && child.offset.is_none() {
                continue;
            }

            let mut ctx = EmitCtx::new();
            let built = temptable::build_execution_plan(
                &self.registry,
                &plan.root_entity,
                &plan.root_alias,
                &alias_path,
                navigation,
                child,
                &mut ctx,
            );
            let exec_plan = match built {
                Ok(p) => p,
                Err(err) => {
                    self.drop_temp_tables(exec, &drops).await;
                    return Err(err.into());
                }
            };

            let bound = bind_params(ctx.params);
            let refs = as_sql_refs(&bound);
            if let Err(err) = exec.execute(&exec_plan.create_and_populate_sql, &refs).await {
                self.drop_temp_tables(exec, &drops).await;
                return Err(err.into());
            }
            drops.push(exec_plan.drop_sql);
        }
        Ok(drops)
    }

    async fn drop_temp_tables<E: SqlExecutor + ?Sized>(&self, exec: &mut E, drops: &[String]) {
        for sql in drops {
            if let Err(err) = exec.execute(sql, &[]).await {
                warn!("failed to drop temp table during cleanup: {}", err);
            }
        }
    }

    /// Runs `plan` as a row-producing subquery wrapped by `wrap`, for
    /// the root-level `count()`/`exists()` terminals — these aggregate
    /// over the plan's own rows, not a correlated collection field, so
    /// they reuse `emit_row_select` directly rather than going through
    /// the Collection Strategy Engine.
    async fn run_root_aggregate<E: SqlExecutor + ?Sized>(
        &self,
        exec: &mut E,
        plan: &Plan,
        wrap: impl Fn(&str) -> String,
    ) -> Result<DriverValue, OrmError> {
        let mut ctx = EmitCtx::new();
        let inner_sql = crate::emit::emit_row_select(plan, &self.registry, &mut ctx, None)?;
        let sql = wrap(&inner_sql);
        let bound = bind_params(ctx.params);
        let refs = as_sql_refs(&bound);
        let result = exec.execute(&sql, &refs).await?;
        let row = result
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::Driver("aggregate query returned no rows".to_string()))?;
        row.get("value")
            .cloned()
            .ok_or_else(|| OrmError::Driver("aggregate query result missing the \"value\" column".to_string()))
    }

    async fn run_insert_chunks<E: SqlExecutor + ?Sized>(
        &self,
        exec: &mut E,
        insert_plan: &InsertPlan,
        chunks: Vec<(String, Vec<AppValue>)>,
    ) -> Result<Vec<MaterializedValue>, OrmError> {
        let mut decoded = Vec::new();
        for (sql, params) in chunks {
            let bound = bind_params(params);
            let refs = as_sql_refs(&bound);
            let result = exec.execute(&sql, &refs).await?;
            if let Some(returning) = &insert_plan.returning {
                for row in &result.rows {
                    decoded.push(materialize::decode_row(row, returning, &self.registry)?);
                }
            }
        }
        Ok(decoded)
    }

    async fn run_mutation<E: SqlExecutor + ?Sized>(
        &self,
        exec: &mut E,
        sql: &str,
        params: Vec<AppValue>,
        returning: Option<&Vec<ProjectedField>>,
    ) -> Result<Vec<MaterializedValue>, OrmError> {
        let bound = bind_params(params);
        let refs = as_sql_refs(&bound);
        let result = exec.execute(sql, &refs).await?;
        match returning {
            Some(fields) => result
                .rows
                .iter()
                .map(|row| materialize::decode_row(row, fields, &self.registry).map_err(OrmError::from))
                .collect(),
            None => Ok(Vec::new()),
        }
    }
}

/// The builder's `insert`/`update`/`delete` methods are the only
/// producers of these plan variants (`src/builder/query.rs`); a `Plan`
/// reaching here with a mismatched variant is a caller bug, not a
/// runtime data condition — the same invariant `emit_insert`'s own
/// `.expect(...)` already leans on for validated-at-construction-time
/// bulk-insert columns.
fn expect_insert(plan: &Plan) -> &InsertPlan {
    match &plan.variant {
        PlanVariant::Insert(p) => p,
        _ => panic!("QueryEngine::insert called with a plan not built by QueryBuilder::insert"),
    }
}

fn expect_update(plan: &Plan) -> &crate::builder::plan::UpdatePlan {
    match &plan.variant {
        PlanVariant::Update(p) => p,
        _ => panic!("QueryEngine::update called with a plan not built by QueryBuilder::update"),
    }
}

fn expect_delete(plan: &Plan) -> &crate::builder::plan::DeletePlan {
    match &plan.variant {
        PlanVariant::Delete(p) => p,
        _ => panic!("QueryEngine::delete called with a plan not built by QueryBuilder::delete"),
    }
}

fn bind_params(params: Vec<AppValue>) -> Vec<DriverValue> {
    params.into_iter().map(DriverValue::from).collect()
}

fn as_sql_refs(bound: &[DriverValue]) -> Vec<&(dyn ToSql + Sync)> {
    bound.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}
