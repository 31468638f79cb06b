//! Entity metadata types (spec.md §3 "Entity metadata", §4.2).
//!
//! Grounded on `graph_catalog::graph_schema::{NodeSchema, NodeIdSchema}`:
//! plain, `Clone + Serialize + Deserialize` descriptor structs assembled
//! once at configuration time and shared process-wide behind an `Arc`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::mapper::ValueMapper;
use crate::value::AppValue;

/// One registered entity type: its physical table plus the properties
/// and navigations callers can reference by name.
#[derive(Clone)]
pub struct EntityDescriptor {
    pub entity_name: String,
    pub table_name: String,
    pub schema_name: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    pub navigations: Vec<NavigationDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl EntityDescriptor {
    pub fn qualified_table(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.table_name),
            None => format!("\"{}\"", self.table_name),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.property_name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationDescriptor> {
        self.navigations.iter().find(|n| n.property_name == name)
    }

    pub fn primary_key(&self) -> Vec<&PropertyDescriptor> {
        self.properties.iter().filter(|p| p.primary_key).collect()
    }
}

#[derive(Clone)]
pub struct PropertyDescriptor {
    pub property_name: String,
    pub column_name: String,
    pub sql_type: String,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub required: bool,
    pub unique: bool,
    pub default_expr: Option<String>,
    pub value_mapper: Option<Arc<dyn ValueMapper>>,
}

impl PropertyDescriptor {
    pub fn new(property_name: impl Into<String>, column_name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            column_name: column_name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
            auto_increment: false,
            required: false,
            unique: false,
            default_expr: None,
            value_mapper: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default_expr = Some(expr.into());
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn ValueMapper>) -> Self {
        self.value_mapper = Some(mapper);
        self
    }

    pub fn map_from_driver(&self, value: AppValue) -> AppValue {
        match &self.value_mapper {
            Some(mapper) if !value.is_null() => mapper.from_driver(value),
            _ => value,
        }
    }

    pub fn map_to_driver(&self, value: AppValue) -> AppValue {
        match &self.value_mapper {
            Some(mapper) if !value.is_null() => mapper.to_driver(value),
            _ => value,
        }
    }
}

/// A constant embedded in a navigation's key tuple in place of a column
/// (spec.md §3 "Composite-key literal parts"): emitted literally in the
/// join condition rather than as a column reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralKeyPart {
    Int(i64),
    Bool(bool),
    Text(String),
    RawSql(String),
}

impl LiteralKeyPart {
    pub fn to_sql(&self) -> String {
        match self {
            LiteralKeyPart::Int(i) => i.to_string(),
            LiteralKeyPart::Bool(b) => b.to_string(),
            LiteralKeyPart::Text(s) => format!("'{}'", s.replace('\'', "''")),
            LiteralKeyPart::RawSql(sql) => sql.clone(),
        }
    }
}

/// One element of a navigation's correlation key tuple: either a pair of
/// columns to join on, or one physical column pinned to a literal
/// instead of read from the other side (spec.md §3 "Composite-key
/// literal parts" — `"a"."type" = 1` rather than a column comparison).
/// The literal always constrains `column`, a real physical column on
/// whichever entity owns it per the navigation's FK-side rule (spec.md
/// §4.4 step 4 treats this the same as `Columns` for alias resolution,
/// differing only in what the planner emits on the right-hand side).
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Columns {
        foreign_key_column: String,
        principal_key_column: String,
    },
    Literal {
        column: String,
        value: LiteralKeyPart,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationKind {
    One,
    Many,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

#[derive(Clone)]
pub struct NavigationDescriptor {
    pub property_name: String,
    pub target_entity: String,
    pub kind: NavigationKind,
    pub key: Vec<KeyPart>,
    pub is_mandatory: bool,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub constraint_name: Option<String>,
    /// True when the FK constraint physically lives on the *other* side
    /// of this navigation (spec.md §3 invariant: FK constraints are
    /// emitted exactly once, by the owning side).
    pub is_inverse: bool,
}

impl NavigationDescriptor {
    pub fn join_kind_is_inner(&self) -> bool {
        self.is_mandatory
    }
}

#[derive(Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Clone)]
pub struct ForeignKeyDescriptor {
    pub constraint_name: String,
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
}
