//! relorm - PostgreSQL object-relational query compilation and
//! materialization engine.
//!
//! A caller describes an entity's schema once (`schema::SchemaRegistry`),
//! builds a query against it with a fluent, immutable `Plan` tree
//! (`builder::QueryBuilder`), and drives one of six terminal operations
//! (`engine::QueryEngine::to_list`/`first`/`count`/`exists`/`insert`/
//! `update`/`delete`). Everything between those two points — expression
//! rendering, navigation join planning, one-to-many collection
//! materialization, SQL emission, and row decoding — is internal
//! plumbing a caller never touches directly.
//!
//! # Module map
//! - [`expr`] — the Expression & Condition Tree callers build filters,
//!   projections, and assignments out of.
//! - [`schema`] — entity/property/navigation descriptors and the
//!   registry that resolves them.
//! - [`builder`] — the `Plan` value and the `QueryBuilder` fluent API.
//! - [`planner`] — the Navigation Join Planner (`prop_path` resolution).
//! - [`strategy`] — the Collection Strategy Engine (CTE/TempTable/LATERAL).
//! - [`cte`] — shared CTE-rendering helpers used by the builder and the
//!   CTE/TempTable strategies.
//! - [`emit`] — the SQL Emitter.
//! - [`materialize`] — the Row Materializer.
//! - [`txn`] — the Transaction Scope.
//! - [`driver`] — the pluggable connection/pool contract the engine runs
//!   against; a concrete backend is supplied by the application.
//! - [`engine`] — binds the above into the terminal operations.
//! - [`value`] — the closed `AppValue`/`DriverValue` representations
//!   that flow between them.
//! - [`config`] — environment-driven engine configuration.
//! - [`error`] — the crate-wide `OrmError` aggregating every component's
//!   own error type.

pub mod builder;
pub mod config;
pub mod cte;
pub mod driver;
pub mod emit;
pub mod engine;
pub mod error;
pub mod expr;
pub mod materialize;
pub mod planner;
pub mod schema;
pub mod strategy;
pub mod txn;
pub mod value;

pub use builder::{Plan, QueryBuilder};
pub use engine::QueryEngine;
pub use error::{ErrorKind, OrmError};
pub use schema::SchemaRegistry;
pub use value::{AppValue, DriverValue};
