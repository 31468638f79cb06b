//! Closed value representations bridging application code and the wire.
//!
//! Grounded on `graph_catalog::expression_parser::PropertyValue`: a small,
//! closed enum beats `Box<dyn Any>` here because `ValueMapper` impls need
//! to pattern-match without downcasting, and because these values must be
//! `Clone`/`Send`/`Sync` to flow through plan trees shared across
//! concurrent executions (spec.md §5).

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A value as the application sees it — the output of a `ValueMapper::from_driver`
/// call, or the input to a condition/assignment expressed by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    /// Escape hatch for application types a mapper produces that don't fit
    /// the other variants (e.g. a caller's own `Instant` newtype) — stored
    /// pre-serialized so the materializer never needs to know about it.
    Opaque(serde_json::Value),
}

impl AppValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AppValue::Null)
    }
}

/// A value as the driver sees it — what actually gets bound as a `$n`
/// parameter or decoded from a `Row` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl DriverValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DriverValue::Null)
    }
}

impl From<AppValue> for DriverValue {
    fn from(v: AppValue) -> Self {
        match v {
            AppValue::Null => DriverValue::Null,
            AppValue::Bool(b) => DriverValue::Bool(b),
            AppValue::Int(i) => DriverValue::Int(i),
            AppValue::Float(f) => DriverValue::Float(f),
            AppValue::Text(s) => DriverValue::Text(s),
            AppValue::Bytes(b) => DriverValue::Bytes(b),
            AppValue::Json(j) | AppValue::Opaque(j) => DriverValue::Json(j),
        }
    }
}

impl From<DriverValue> for AppValue {
    fn from(v: DriverValue) -> Self {
        match v {
            DriverValue::Null => AppValue::Null,
            DriverValue::Bool(b) => AppValue::Bool(b),
            DriverValue::Int(i) => AppValue::Int(i),
            DriverValue::Float(f) => AppValue::Float(f),
            DriverValue::Text(s) => AppValue::Text(s),
            DriverValue::Bytes(b) => AppValue::Bytes(b),
            DriverValue::Json(j) => AppValue::Json(j),
        }
    }
}

/// Binds a `DriverValue` straight to `tokio_postgres` by delegating to
/// whichever primitive type's own `ToSql` impl matches the variant —
/// the closed enum stays a single bindable unit instead of forcing
/// every emitter/executor call site to match on variants itself.
impl ToSql for DriverValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            DriverValue::Null => Ok(IsNull::Yes),
            DriverValue::Bool(b) => b.to_sql(ty, out),
            DriverValue::Int(i) => i.to_sql(ty, out),
            DriverValue::Float(f) => f.to_sql(ty, out),
            DriverValue::Text(s) => s.to_sql(ty, out),
            DriverValue::Bytes(b) => b.to_sql(ty, out),
            DriverValue::Json(j) => j.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
