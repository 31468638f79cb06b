//! Integration tests: drive `QueryEngine<FakeDriver>` through its
//! terminal operations end to end (emit -> execute -> decode), scripting
//! the driver's responses instead of talking to real PostgreSQL.

#[path = "../support/mod.rs"]
mod support;

use relorm::builder::plan::{Assignment, Direction};
use relorm::builder::projection::{CollectionTerminal, ProjectedField};
use relorm::builder::QueryBuilder;
use relorm::config::{CollectionStrategy, EngineConfig, QueryOptions};
use relorm::driver::{QueryResult, QueryRow};
use relorm::engine::QueryEngine;
use relorm::expr::{Condition, Expr};
use relorm::materialize::MaterializedValue;
use relorm::schema::{
    EntityDescriptor, KeyPart, NavigationDescriptor, NavigationKind, PropertyDescriptor,
    SchemaRegistry,
};
use relorm::value::{AppValue, DriverValue};
use relorm::ErrorKind;

use support::FakeDriver;

fn registry() -> SchemaRegistry {
    let mut r = SchemaRegistry::new();
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
        navigations: vec![NavigationDescriptor {
            property_name: "user".into(),
            target_entity: "User".into(),
            kind: NavigationKind::One,
            key: vec![KeyPart::Columns {
                foreign_key_column: "user_id".into(),
                principal_key_column: "id".into(),
            }],
            is_mandatory: true,
            on_delete: None,
            on_update: None,
            constraint_name: Some("fk_posts_user".into()),
            is_inverse: true,
        }],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();
    r.register(EntityDescriptor {
        entity_name: "User".into(),
        table_name: "users".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("id", "id", "bigint").primary_key().auto_increment(),
            PropertyDescriptor::new("name", "name", "text").required(),
        ],
        navigations: vec![NavigationDescriptor {
            property_name: "posts".into(),
            target_entity: "Post".into(),
            kind: NavigationKind::Many,
            key: vec![KeyPart::Columns {
                foreign_key_column: "user_id".into(),
                principal_key_column: "id".into(),
            }],
            is_mandatory: false,
            on_delete: None,
            on_update: None,
            constraint_name: None,
            is_inverse: false,
        }],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();
    r
}

fn engine(driver: FakeDriver) -> QueryEngine<FakeDriver> {
    QueryEngine::new(driver, registry(), EngineConfig::default())
}

#[tokio::test]
async fn to_list_decodes_a_cte_backed_collection_field() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![
            ("name".into(), DriverValue::Text("Ada".into())),
            (
                "posts".into(),
                DriverValue::Json(serde_json::json!([
                    {"title": "Hello", "views": 10},
                    {"title": "World", "views": 5},
                ])),
            ),
        ])],
        row_count: 1,
    });
    let engine = engine(driver);

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

    let rows = engine.to_list(&plan).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("name"),
        Some(&MaterializedValue::Scalar(AppValue::Text("Ada".into())))
    );
    let posts = rows[0].get("posts").unwrap().as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(
        posts[0].get("title"),
        Some(&MaterializedValue::Scalar(AppValue::Text("Hello".into())))
    );
}

#[tokio::test]
async fn count_runs_a_single_aggregate_statement() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![("value".into(), DriverValue::Int(3))])],
        row_count: 1,
    });
    let eng = engine(driver.clone());

    let plan = QueryBuilder::new("User", "u")
        .filter(Condition::IsNotNull(Expr::path("name")))
        .build();

    let count = eng.count(&plan).await.unwrap();
    assert_eq!(count, 3);
    assert_eq!(driver.executed_statements().len(), 1);
}

#[tokio::test]
async fn exists_decodes_a_boolean_aggregate() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![("value".into(), DriverValue::Bool(true))])],
        row_count: 1,
    });
    let eng = engine(driver);

    let plan = QueryBuilder::new("User", "u").build();
    assert!(eng.exists(&plan).await.unwrap());
}

#[tokio::test]
async fn bulk_insert_chunks_across_the_param_ceiling() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult::default());
    driver.push_ok(QueryResult::default());
    let config = EngineConfig {
        pool_max_size: 1,
        max_statement_params: 4,
        ..EngineConfig::default()
    };
    let eng = QueryEngine::new(driver.clone(), registry(), config);

    let rows = (0..3)
        .map(|i| {
            vec![Assignment {
                column: "name".into(),
                value: Expr::Constant(AppValue::Text(format!("user-{}", i))),
            }]
        })
        .collect();
    let plan = QueryBuilder::new("User", "u").insert("User", rows).unwrap();

    let decoded = eng.insert(&plan).await.unwrap();
    assert!(decoded.is_empty());
    assert_eq!(driver.executed_statements().len(), 2);
}

#[tokio::test]
async fn update_decodes_returning_rows() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![("id".into(), DriverValue::Int(7))])],
        row_count: 1,
    });
    let eng = engine(driver);

    let plan = QueryBuilder::new("User", "u")
        .filter(Condition::Eq(Expr::path("id"), Some(Expr::Constant(AppValue::Int(7)))))
        .update(
            "User",
            "u",
            vec![Assignment {
                column: "name".into(),
                value: Expr::Constant(AppValue::Text("New".into())),
            }],
        )
        .unwrap();
    let plan = QueryBuilder::from_plan(plan)
        .returning(vec![ProjectedField::scalar(
            "id",
            Expr::Column { alias: "u".into(), column: "id".into() },
        )])
        .build();

    let decoded = eng.update(&plan).await.unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(
        decoded[0].get("id"),
        Some(&MaterializedValue::Scalar(AppValue::Int(7)))
    );
}

#[tokio::test]
async fn delete_without_returning_yields_no_rows() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult { rows: vec![], row_count: 1 });
    let eng = engine(driver);

    let plan = QueryBuilder::new("User", "u")
        .filter(Condition::Eq(Expr::path("id"), Some(Expr::Constant(AppValue::Int(1)))))
        .delete("User", "u");

    let decoded = eng.delete(&plan).await.unwrap();
    assert!(decoded.is_empty());
}

#[tokio::test]
async fn temp_table_strategy_creates_and_drops_around_the_outer_select() {
    let driver = FakeDriver::new();
    driver.push_ok(QueryResult::default()); // CREATE TEMP TABLE ...
    driver.push_ok(QueryResult {
        rows: vec![QueryRow::new(vec![
            ("name".into(), DriverValue::Text("Ada".into())),
            (
                "posts".into(),
                DriverValue::Json(serde_json::json!([{"title": "Hello", "views": 10}])),
            ),
        ])],
        row_count: 1,
    }); // outer SELECT
    driver.push_ok(QueryResult::default()); // DROP TABLE ...
    let eng = engine(driver.clone());

    let child = QueryBuilder::new("Post", "p")
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
        .with_query_options(QueryOptions {
            collection_strategy: CollectionStrategy::TempTable,
            ..QueryOptions::default()
        })
        .build();

    let rows = eng.to_list(&plan).await.unwrap();
    assert_eq!(rows.len(), 1);

    let statements = driver.executed_statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("CREATE TEMP TABLE"));
    assert!(statements[1].starts_with("SELECT"));
    assert!(statements[2].starts_with("DROP TABLE"));
}

#[tokio::test]
async fn per_parent_limit_on_the_cte_strategy_is_rejected_before_any_sql_runs() {
    let driver = FakeDriver::new();
    let eng = engine(driver.clone());

    let child = QueryBuilder::new("Post", "p")
        .order_by(Expr::path("views"), Direction::Desc)
        .limit(1)
        .select(vec![ProjectedField::scalar("title", Expr::path("title"))])
        .unwrap()
        .build();
    let plan = QueryBuilder::new("User", "u")
        .select(vec![ProjectedField::collection(
            "top_post",
            "posts",
            child,
            CollectionTerminal::ToList,
        )])
        .unwrap()
        .build();

    let err = eng.to_list(&plan).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlanError);
    assert!(driver.executed_statements().is_empty());
}
