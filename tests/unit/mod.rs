//! Focused unit tests over the crate's fully-public surface. Each
//! `[[test]]` target compiles as its own crate, so only `pub` items are
//! reachable here — helpers that are merely `pub(crate)` are covered by
//! inline `#[cfg(test)]` modules alongside their definitions instead
//! (see `src/strategy/mod.rs`, `src/txn/mod.rs`).

mod mapper_mock;

use relorm::builder::plan::Plan;
use relorm::builder::projection::{CollectionTerminal, ProjectedField};
use relorm::config::ConfigError;
use relorm::driver::DriverError;
use relorm::expr::Expr;
use relorm::schema::descriptor::{EntityDescriptor, KeyPart, LiteralKeyPart, NavigationDescriptor, NavigationKind, PropertyDescriptor};
use relorm::schema::SchemaRegistry;
use relorm::strategy::correlation_columns;
use relorm::ErrorKind;
use relorm::OrmError;

// --- ProjectedField tree ------------------------------------------------

#[test]
fn collect_scalar_aliases_joins_nested_object_paths_with_double_underscore() {
    let projection = vec![ProjectedField::object(
        "profile",
        vec![
            ProjectedField::scalar("name", Expr::path("name")),
            ProjectedField::scalar("age", Expr::path("age")),
        ],
    )];
    let aliases = ProjectedField::collect_scalar_aliases(&projection, "");
    let names: Vec<&str> = aliases.iter().map(|(name, _, _)| name.as_str()).collect();
    assert_eq!(names, vec!["profile__name", "profile__age"]);
}

#[test]
fn collect_scalar_aliases_skips_collection_leaves() {
    let child = Plan::new("Post", "p");
    let projection = vec![
        ProjectedField::scalar("name", Expr::path("name")),
        ProjectedField::collection("posts", "posts", child, CollectionTerminal::ToList),
    ];
    let aliases = ProjectedField::collect_scalar_aliases(&projection, "");
    assert_eq!(aliases.len(), 1);
    assert_eq!(aliases[0].0, "name");
}

#[test]
fn collection_fields_finds_a_collection_nested_inside_an_object() {
    let child = Plan::new("Post", "p");
    let projection = vec![ProjectedField::object(
        "profile",
        vec![ProjectedField::collection(
            "posts",
            "posts",
            child,
            CollectionTerminal::ToList,
        )],
    )];
    let found = ProjectedField::collection_fields(&projection, "");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, "profile__posts");
}

#[test]
fn has_collection_field_is_false_for_an_all_scalar_projection() {
    let projection = vec![ProjectedField::scalar("name", Expr::path("name"))];
    assert!(!ProjectedField::has_collection_field(&projection));
}

// --- Plan -----------------------------------------------------------------

#[test]
fn plan_new_starts_unselected_with_empty_clauses() {
    let plan = Plan::new("User", "u");
    assert_eq!(plan.root_entity, "User");
    assert_eq!(plan.root_alias, "u");
    assert!(plan.filters.is_empty());
    assert!(!plan.has_order_by());
    assert!(plan.limit.is_none());
    assert!(plan.projection().is_none());
    assert!(!plan.is_grouped());
}

#[test]
fn projection_has_collection_reflects_the_current_select() {
    let without = {
        let mut p = Plan::new("User", "u");
        p.variant = relorm::builder::plan::PlanVariant::Select {
            projection: vec![ProjectedField::scalar("name", Expr::path("name"))],
        };
        p
    };
    assert!(!without.projection_has_collection());

    let child = Plan::new("Post", "p");
    let with = {
        let mut p = Plan::new("User", "u");
        p.variant = relorm::builder::plan::PlanVariant::Select {
            projection: vec![ProjectedField::collection(
                "posts",
                "posts",
                child,
                CollectionTerminal::ToList,
            )],
        };
        p
    };
    assert!(with.projection_has_collection());
}

// --- Schema descriptors -----------------------------------------------

#[test]
fn qualified_table_includes_the_schema_only_when_set() {
    let mut entity = EntityDescriptor {
        entity_name: "User".into(),
        table_name: "users".into(),
        schema_name: None,
        properties: vec![],
        navigations: vec![],
        indexes: vec![],
        foreign_keys: vec![],
    };
    assert_eq!(entity.qualified_table(), "\"users\"");
    entity.schema_name = Some("app".into());
    assert_eq!(entity.qualified_table(), "\"app\".\"users\"");
}

#[test]
fn literal_key_part_to_sql_escapes_embedded_quotes() {
    let literal = LiteralKeyPart::Text("O'Brien".into());
    assert_eq!(literal.to_sql(), "'O''Brien'");
    assert_eq!(LiteralKeyPart::Int(7).to_sql(), "7");
    assert_eq!(LiteralKeyPart::Bool(true).to_sql(), "true");
}

#[test]
fn primary_key_returns_every_flagged_property_in_declaration_order() {
    let entity = EntityDescriptor {
        entity_name: "Membership".into(),
        table_name: "memberships".into(),
        schema_name: None,
        properties: vec![
            PropertyDescriptor::new("user_id", "user_id", "bigint").primary_key(),
            PropertyDescriptor::new("org_id", "org_id", "bigint").primary_key(),
            PropertyDescriptor::new("role", "role", "text"),
        ],
        navigations: vec![],
        indexes: vec![],
        foreign_keys: vec![],
    };
    let pk: Vec<&str> = entity.primary_key().iter().map(|p| p.property_name.as_str()).collect();
    assert_eq!(pk, vec!["user_id", "org_id"]);
}

// --- strategy::correlation_columns (pub entry point) -------------------

fn registry_with(nav: NavigationDescriptor) -> SchemaRegistry {
    let mut r = SchemaRegistry::new();
    r.register(EntityDescriptor {
        entity_name: "User".into(),
        table_name: "users".into(),
        schema_name: None,
        properties: vec![PropertyDescriptor::new("id", "id", "bigint").primary_key()],
        navigations: vec![nav],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();
    r.register(EntityDescriptor {
        entity_name: "Post".into(),
        table_name: "posts".into(),
        schema_name: None,
        properties: vec![PropertyDescriptor::new("id", "id", "bigint").primary_key()],
        navigations: vec![],
        indexes: vec![],
        foreign_keys: vec![],
    })
    .unwrap();
    r
}

#[test]
fn correlation_columns_resolves_a_single_column_many_navigation() {
    let registry = registry_with(NavigationDescriptor {
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
    });
    let (parent, parent_key, child_key) = correlation_columns(&registry, "User", "posts").unwrap();
    assert_eq!(parent.entity_name, "User");
    assert_eq!(parent_key, "id");
    assert_eq!(child_key, "user_id");
}

#[test]
fn correlation_columns_rejects_a_one_navigation() {
    let registry = registry_with(NavigationDescriptor {
        property_name: "primary_post".into(),
        target_entity: "Post".into(),
        kind: NavigationKind::One,
        key: vec![KeyPart::Columns {
            foreign_key_column: "primary_post_id".into(),
            principal_key_column: "id".into(),
        }],
        is_mandatory: false,
        on_delete: None,
        on_update: None,
        constraint_name: None,
        is_inverse: false,
    });
    let err = correlation_columns(&registry, "User", "primary_post").unwrap_err();
    assert!(matches!(
        err,
        relorm::strategy::errors::StrategyError::NotAToManyNavigation(_)
    ));
}

#[test]
fn correlation_columns_rejects_a_composite_key_many_navigation() {
    let registry = registry_with(NavigationDescriptor {
        property_name: "posts".into(),
        target_entity: "Post".into(),
        kind: NavigationKind::Many,
        key: vec![
            KeyPart::Columns {
                foreign_key_column: "user_id".into(),
                principal_key_column: "id".into(),
            },
            KeyPart::Columns {
                foreign_key_column: "tenant_id".into(),
                principal_key_column: "tenant_id".into(),
            },
        ],
        is_mandatory: false,
        on_delete: None,
        on_update: None,
        constraint_name: None,
        is_inverse: false,
    });
    let err = correlation_columns(&registry, "User", "posts").unwrap_err();
    assert!(matches!(
        err,
        relorm::strategy::errors::StrategyError::NotAToManyNavigation(_)
    ));
}

// --- OrmError::kind() classification -------------------------------------

#[test]
fn configuration_error_classifies_as_configuration_error() {
    let err: OrmError = ConfigError::UnknownStrategy("bogus".into()).into();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}

#[test]
fn constraint_violation_passes_through_from_the_driver() {
    let err: OrmError = DriverError::ConstraintViolation("duplicate key".into()).into();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
}

#[test]
fn cancelled_driver_error_classifies_as_cancellation() {
    let err: OrmError = DriverError::Cancelled.into();
    assert_eq!(err.kind(), ErrorKind::CancellationError);
}

#[test]
fn plain_execution_failure_classifies_as_driver_error() {
    let err: OrmError = DriverError::Execution("timeout".into()).into();
    assert_eq!(err.kind(), ErrorKind::DriverError);
}

#[test]
fn unresolved_path_classifies_as_plan_error_not_invalid_condition() {
    let mut ctx = relorm::expr::EmitCtx::new();
    let err: OrmError = Expr::path("user.name").emit(&mut ctx).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::PlanError);
}
