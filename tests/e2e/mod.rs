//! End-to-end scenarios against `QueryEngine<FakeDriver>`: each test
//! scripts a full round trip for one of the composite behaviors the
//! individual unit/integration suites only exercise in isolation —
//! per-collection ordering, per-parent limiting, sibling collections
//! with alias isolation, mapped values reached through a multi-level
//! navigation, null-comparison rejection, and transaction rollback.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use relorm::builder::plan::{Assignment, Direction};
use relorm::builder::projection::{CollectionTerminal, ProjectedField};
use relorm::builder::QueryBuilder;
use relorm::config::{CollectionStrategy, EngineConfig, QueryOptions};
use relorm::driver::{DriverError, QueryResult, QueryRow};
use relorm::engine::QueryEngine;
use relorm::expr::{Condition, Expr};
use relorm::materialize::MaterializedValue;
use relorm::schema::mapper::CustomEpochInstantMapper;
use relorm::schema::{
    EntityDescriptor, KeyPart, NavigationDescriptor, NavigationKind, PropertyDescriptor,
    SchemaRegistry,
};
use relorm::txn::{run_in_transaction, TransactionScope};
use relorm::value::{AppValue, DriverValue};
use relorm::ErrorKind;

use support::FakeDriver;

fn one_to_many(property_name: &str, target_entity: &str, fk: &str, pk: &str) -> NavigationDescriptor {
    NavigationDescriptor {
        property_name: property_name.into(),
        target_entity: target_entity.into(),
        kind: NavigationKind::Many,
        key: vec![KeyPart::Columns {
            foreign_key_column: fk.into(),
            principal_key_column: pk.into(),
        }],
        is_mandatory: false,
        on_delete: None,
        on_update: None,
        constraint_name: None,
        is_inverse: false,
    }
}

fn many_to_one(property_name: &str, target_entity: &str, fk: &str, pk: &str, mandatory: bool) -> NavigationDescriptor {
    NavigationDescriptor {
        property_name: property_name.into(),
        target_entity: target_entity.into(),
        kind: NavigationKind::One,
        key: vec![KeyPart::Columns {
            foreign_key_column: fk.into(),
            principal_key_column: pk.into(),
        }],
        is_mandatory: mandatory,
        on_delete: None,
        on_update: None,
        constraint_name: Some(format!("fk_{}", property_name)),
        is_inverse: true,
    }
}

/// `User`/`Post` (scenarios 1, 2, 5, 6), `Product`/`Tag`/`Price`/
/// `CapacityGroup` (scenario 3), `OrderTask`/`Task`/`Level` chaining back
/// to `User` (scenario 4).
fn registry() -> SchemaRegistry {
    let mut r = SchemaRegistry::new();

    r.register(EntityDescriptor {
        entity_name: "User".into(),
        table_name: "users".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("name", "name", "text").required(),
            PropertyDescriptor::new("age", "age", "integer"),
            PropertyDescriptor::new("last_active_at", "last_active_at", "bigint").with_mapper(Arc::new(
                CustomEpochInstantMapper { epoch_offset_seconds: 1_000_000_000 },
            )),
        ],
        navigations: vec![one_to_many("posts", "Post", "user_id", "id")],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "Post".into(),
        table_name: "posts".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("title", "title", "text").required(),
            PropertyDescriptor::new("views", "views", "bigint").required(),
            PropertyDescriptor::new("user_id", "user_id", "bigint").required(),
        ],
        navigations: vec![many_to_one("user", "User", "user_id", "id", true)],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "Product".into(),
        table_name: "products".into(),
        schema_name: None,
        properties: vec![PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment()],
        navigations: vec![
            one_to_many("tags", "Tag", "product_id", "id"),
            one_to_many("prices", "Price", "product_id", "id"),
        ],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "Tag".into(),
        table_name: "tags".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("label", "label", "text").required(),
            PropertyDescriptor::new("product_id", "product_id", "bigint").required(),
        ],
        navigations: vec![],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "Price".into(),
        table_name: "prices".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("amount", "amount", "numeric").required(),
            PropertyDescriptor::new("product_id", "product_id", "bigint").required(),
        ],
        navigations: vec![one_to_many("capacity_groups", "CapacityGroup", "price_id", "id")],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "CapacityGroup".into(),
        table_name: "capacity_groups".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("capacity", "capacity", "integer").required(),
            PropertyDescriptor::new("price_id", "price_id", "bigint").required(),
        ],
        navigations: vec![],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "Level".into(),
        table_name: "levels".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("created_by_id", "created_by_id", "bigint").required(),
        ],
        navigations: vec![many_to_one("created_by", "User", "created_by_id", "id", true)],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "Task".into(),
        table_name: "tasks".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("level_id", "level_id", "bigint").required(),
        ],
        navigations: vec![many_to_one("level", "Level", "level_id", "id", true)],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r.register(EntityDescriptor {
        entity_name: "OrderTask".into(),
        table_name: "order_tasks".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("task_id", "task_id", "bigint").required(),
        ],
        navigations: vec![many_to_one("task", "Task", "task_id", "id", true)],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();

    r
}

fn engine(driver: FakeDriver) -> QueryEngine<FakeDriver> {
    QueryEngine::new(driver, registry(), EngineConfig::default())
}

/// Scenario 1: `User -> posts` through the default CTE strategy, with the
/// collection's own per-row `order_by` honored inside its aggregate.
#[tokio::test]
async fn user_posts_cte_strategy_honors_per_collection_ordering() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![
            ("name".into(), DriverValue::Text("Ada".into())),
            (
                "posts".into(),
                DriverValue::Json(serde_json::json!([
                    {"title": "Most viewed", "views": 100},
                    {"title": "Least viewed", "views": 1},
                ])),
            ),
        ])],
        row_count: 1,
    });
    let eng = engine(driver);

    let child = QueryBuilder::new("Post", "p")
        .order_by(Expr::path("views"), Direction::Desc)
        .select(vec![
            ProjectedField::scalar("title", Expr::path("title")),
            ProjectedField::scalar("views", Expr::path("views")),
        ])
        .unwrap()
        .build();
    let plan = QueryBuilder::new("User", "u")
        .select(vec![
            ProjectedField::scalar("name", Expr::path("name")),
            ProjectedField::collection("posts", "posts", child, CollectionTerminal::ToList),
        ])
        .unwrap()
        .build();

    let rows = eng.to_list(&plan).await.unwrap();
    let posts = rows[0].get("posts").unwrap().as_array().unwrap();
    assert_eq!(
        posts[0].get("title"),
        Some(&MaterializedValue::Scalar(AppValue::Text("Most viewed".into())))
    );
}

/// Scenario 2: a per-parent `limit` on a collection field is only legal
/// under the LATERAL strategy — CTE and TempTable both reject it before
/// any SQL runs.
#[tokio::test]
async fn per_parent_limit_requires_lateral() {
    let child_limited = || {
        QueryBuilder::new("Post", "p")
            .order_by(Expr::path("views"), Direction::Desc)
            .limit(1)
            .select(vec![ProjectedField::scalar("title", Expr::path("title"))])
            .unwrap()
            .build()
    };

    for rejecting_strategy in [CollectionStrategy::Cte, CollectionStrategy::TempTable] {
        let driver = FakeDriver::new();
        let eng = engine(driver.clone());
        let plan = QueryBuilder::new("User", "u")
            .select(vec![ProjectedField::collection(
                "top_post",
                "posts",
                child_limited(),
                CollectionTerminal::ToList,
            )])
            .unwrap()
            .with_query_options(QueryOptions {
                collection_strategy: rejecting_strategy,
                ..QueryOptions::default()
            })
            .build();

        let err = eng.to_list(&plan).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlanError);
        assert!(driver.executed_statements().is_empty());
    }

    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![
            ("name".into(), DriverValue::Text("Ada".into())),
            (
                "top_post".into(),
                DriverValue::Json(serde_json::json!({"title": "Most viewed"})),
            ),
        ])],
        row_count: 1,
    });
    let eng = engine(driver);
    let plan = QueryBuilder::new("User", "u")
        .select(vec![ProjectedField::collection(
            "top_post",
            "posts",
            child_limited(),
            CollectionTerminal::ToList,
        )])
        .unwrap()
        .with_query_options(QueryOptions {
            collection_strategy: CollectionStrategy::Lateral,
            ..QueryOptions::default()
        })
        .build();
    let rows = eng.to_list(&plan).await.unwrap();
    assert_eq!(rows.len(), 1);
}

/// Scenario 3: `Product` has two sibling collections, one of which
/// (`prices`) nests its own collection (`capacity_groups`) — each must
/// decode against its own alias path rather than bleeding into the
/// other's.
#[tokio::test]
async fn sibling_and_nested_collections_keep_alias_paths_isolated() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![
            (
                "tags".into(),
                DriverValue::Json(serde_json::json!([{"label": "sale"}])),
            ),
            (
                "prices".into(),
                DriverValue::Json(serde_json::json!([
                    {"amount": 9.99, "capacity_groups": [{"capacity": 10}]}
                ])),
            ),
        ])],
        row_count: 1,
    });
    let eng = engine(driver);

    let capacity_groups_child = QueryBuilder::new("CapacityGroup", "cg")
        .select(vec![ProjectedField::scalar("capacity", Expr::path("capacity"))])
        .unwrap()
        .build();
    let prices_child = QueryBuilder::new("Price", "pr")
        .select(vec![
            ProjectedField::scalar("amount", Expr::path("amount")),
            ProjectedField::collection(
                "capacity_groups",
                "capacity_groups",
                capacity_groups_child,
                CollectionTerminal::ToList,
            ),
        ])
        .unwrap()
        .build();
    let tags_child = QueryBuilder::new("Tag", "t")
        .select(vec![ProjectedField::scalar("label", Expr::path("label"))])
        .unwrap()
        .build();

    let plan = QueryBuilder::new("Product", "prod")
        .select(vec![
            ProjectedField::collection("tags", "tags", tags_child, CollectionTerminal::ToList),
            ProjectedField::collection("prices", "prices", prices_child, CollectionTerminal::ToList),
        ])
        .unwrap()
        .build();

    let rows = eng.to_list(&plan).await.unwrap();
    let tags = rows[0].get("tags").unwrap().as_array().unwrap();
    assert_eq!(
        tags[0].get("label"),
        Some(&MaterializedValue::Scalar(AppValue::Text("sale".into())))
    );
    let prices = rows[0].get("prices").unwrap().as_array().unwrap();
    let capacity_groups = prices[0].get("capacity_groups").unwrap().as_array().unwrap();
    assert_eq!(
        capacity_groups[0].get("capacity"),
        Some(&MaterializedValue::Scalar(AppValue::Int(10)))
    );
}

/// Scenario 4: a custom mapper applied three navigation hops away
/// (`OrderTask -> task -> level -> created_by(User).last_active_at`)
/// still runs through `from_driver` at decode time.
#[tokio::test]
async fn custom_mapper_applies_through_a_three_level_navigation() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![(
            "creator_last_active_at".into(),
            DriverValue::Int(500),
        )])],
        row_count: 1,
    });
    let eng = engine(driver);

    let plan = QueryBuilder::new("OrderTask", "ot")
        .select(vec![ProjectedField::scalar(
            "creator_last_active_at",
            Expr::path("task.level.created_by.last_active_at"),
        )])
        .unwrap()
        .build();

    let rows = eng.to_list(&plan).await.unwrap();
    assert_eq!(
        rows[0].get("creator_last_active_at"),
        Some(&MaterializedValue::Scalar(AppValue::Int(1_000_000_500)))
    );
}

/// Scenario 5: `eq(age, null)` degrades to `IS NULL` and runs fine;
/// `gt(age, null)` is an `InvalidCondition` rejected before any SQL is
/// sent to the driver.
#[tokio::test]
async fn null_comparison_rules_differ_by_operator() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![("value".into(), DriverValue::Int(2))])],
        row_count: 1,
    });
    let eng = engine(driver.clone());

    let eq_plan = QueryBuilder::new("User", "u")
        .filter(Condition::Eq(Expr::path("age"), None))
        .build();
    let count = eng.count(&eq_plan).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(driver.executed_statements().len(), 1);

    let gt_plan = QueryBuilder::new("User", "u")
        .filter(Condition::Gt(Expr::path("age"), Expr::Constant(AppValue::Null)))
        .build();
    let err = eng.count(&gt_plan).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCondition);
    assert_eq!(driver.executed_statements().len(), 1);
}

/// Scenario 6: a failing statement inside `run_in_transaction` rolls the
/// transaction back rather than committing, and the error surfaces to
/// the caller.
#[tokio::test]
async fn a_failing_statement_inside_a_transaction_rolls_back() {
    let driver = FakeDriver::new();
    driver.push_err(DriverError::Execution("syntax error mid-transaction".into()));

    let body: relorm::txn::TransactionBody<'_, (), relorm::txn::errors::TransactionError> =
        Box::new(|scope: &mut TransactionScope<'_>| {
            Box::pin(async move {
                scope.query("INSERT INTO users (name) VALUES ('x')", &[]).await?;
                Ok(())
            })
        });

    let err = run_in_transaction(&driver, body).await.unwrap_err();
    assert!(matches!(err, relorm::txn::errors::TransactionError::Driver(_)));
    assert_eq!(err.kind(), ErrorKind::DriverError);
    assert!(driver.rolled_back());
    assert!(!driver.committed());
}

/// Scenario 6c: a `ConstraintViolation` raised by a statement inside
/// `run_in_transaction` still classifies as `ErrorKind::ConstraintViolation`
/// — the same classification `impl From<DriverError> for OrmError` gives
/// the non-transactional path — rather than collapsing to a generic
/// transaction failure (spec.md §7 "ConstraintViolation... causes
/// enclosing transaction to roll back").
#[tokio::test]
async fn a_constraint_violation_inside_a_transaction_keeps_its_kind() {
    let driver = FakeDriver::new();
    driver.push_err(DriverError::ConstraintViolation("duplicate key".into()));

    let body: relorm::txn::TransactionBody<'_, (), relorm::txn::errors::TransactionError> =
        Box::new(|scope: &mut TransactionScope<'_>| {
            Box::pin(async move {
                scope.query("INSERT INTO users (name) VALUES ('x')", &[]).await?;
                Ok(())
            })
        });

    let err = run_in_transaction(&driver, body).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(driver.rolled_back());
    assert!(!driver.committed());
}

/// Scenario 6b: when the body succeeds, the transaction commits and an
/// `update_scoped` call routed through the same scope reuses its
/// connection instead of acquiring a fresh one.
#[tokio::test]
async fn a_successful_transaction_commits_and_shares_its_connection() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![("id".into(), DriverValue::Int(1))])],
        row_count: 1,
    });
    let eng = Arc::new(engine(driver.clone()));

    let body: relorm::txn::TransactionBody<'_, Vec<MaterializedValue>, relorm::txn::errors::TransactionError> = {
        let eng = eng.clone();
        Box::new(move |scope: &mut TransactionScope<'_>| {
            Box::pin(async move {
                let plan = QueryBuilder::new("User", "u")
                    .filter(Condition::Eq(Expr::path("id"), Some(Expr::Constant(AppValue::Int(1)))))
                    .update(
                        "User",
                        "u",
                        vec![Assignment {
                            column: "name".into(),
                            value: Expr::Constant(AppValue::Text("Renamed".into())),
                        }],
                    )
                    .map_err(|e| Box::new(relorm::OrmError::from(e)))?;
                let plan = QueryBuilder::from_plan(plan)
                    .returning(vec![ProjectedField::scalar(
                        "id",
                        Expr::Column { alias: "u".into(), column: "id".into() },
                    )])
                    .build();
                Ok(eng.update_scoped(scope, &plan).await.map_err(Box::new)?)
            })
        })
    };

    let rows = run_in_transaction(&driver, body).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(driver.committed());
    assert!(!driver.rolled_back());
}
