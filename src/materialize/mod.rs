//! Row Materializer (spec.md §4.8).
//!
//! Decodes the driver's flat row shape back into the `ProjectedField`
//! tree the caller declared: scalar leaves read their aliased column and
//! apply their mapper's `from_driver`, `Object` fields nest recursively,
//! and `Collection` fields parse their strategy's aggregated JSON value
//! and decode each element against the collection's own child
//! projection. Grounded on exograph's selection/aggregate decode split
//! (aggregate JSON parsed once, then per-leaf mappers applied from the
//! projection tree rather than re-discovered from the JSON) and the
//! teacher's `render_plan::property_expansion` column-path handling.

pub mod errors;

use std::sync::Arc;

use crate::builder::projection::{CollectionTerminal, ProjectedField, ProjectionNode};
use crate::driver::QueryRow;
use crate::schema::{SchemaRegistry, ValueMapper};
use crate::value::{AppValue, DriverValue};
use errors::MaterializeError;

/// A decoded value, shaped according to the caller's declared
/// projection rather than any particular wire format. `Object` keeps
/// field order (declaration order) rather than hashing, matching the
/// deterministic-shape invariant the projection tree itself carries
/// (spec.md §3 "shape-stable decoding").
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedValue {
    Null,
    Scalar(AppValue),
    Object(Vec<(String, MaterializedValue)>),
    Array(Vec<MaterializedValue>),
}

impl MaterializedValue {
    pub fn as_scalar(&self) -> Option<&AppValue> {
        match self {
            MaterializedValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, MaterializedValue)]> {
        match self {
            MaterializedValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[MaterializedValue]> {
        match self {
            MaterializedValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&MaterializedValue> {
        self.as_object()?.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// The two shapes a field's value can be read out of: the outer query's
/// flat `QueryRow` for top-level fields, or a JSON object for values
/// nested inside a collection's aggregated payload (spec.md §4.8 rule 3
/// "the inner scalars still pass through `from_driver` mappers resolved
/// from the projection tree, not re-discovered from the JSON").
trait ValueSource {
    fn value_for(&self, alias: &str) -> Option<DriverValue>;
}

impl ValueSource for QueryRow {
    fn value_for(&self, alias: &str) -> Option<DriverValue> {
        QueryRow::get(self, alias).cloned()
    }
}

struct JsonObjectSource<'a>(&'a serde_json::Map<String, serde_json::Value>);

impl ValueSource for JsonObjectSource<'_> {
    fn value_for(&self, alias: &str) -> Option<DriverValue> {
        self.0.get(alias).map(json_to_driver_value)
    }
}

fn json_to_driver_value(value: &serde_json::Value) -> DriverValue {
    match value {
        serde_json::Value::Null => DriverValue::Null,
        serde_json::Value::Bool(b) => DriverValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                DriverValue::Int(i)
            } else {
                DriverValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => DriverValue::Text(s.clone()),
        other => DriverValue::Json(other.clone()),
    }
}

/// Applies `mapper.from_driver` to a decoded driver value, passing nulls
/// through unmapped (spec.md §3 "nulls pass through unmapped").
fn map_from_driver(value: DriverValue, mapper: Option<&Arc<dyn ValueMapper>>) -> AppValue {
    let app_value: AppValue = value.into();
    match mapper {
        Some(m) if !app_value.is_null() => m.from_driver(app_value),
        _ => app_value,
    }
}

/// Decodes one top-level result row against a resolved projection tree
/// (the output of `emit::resolve_projection_for_decode`, which already
/// carries a mapper on every scalar leaf whose property declares one —
/// spec.md §4.8 rule 4: "regardless of navigation depth").
pub fn decode_row(
    row: &QueryRow,
    projection: &[ProjectedField],
    registry: &SchemaRegistry,
) -> Result<MaterializedValue, MaterializeError> {
    Ok(MaterializedValue::Object(decode_fields(row, projection, "", registry)?))
}

pub fn decode_rows(
    rows: &[QueryRow],
    projection: &[ProjectedField],
    registry: &SchemaRegistry,
) -> Result<Vec<MaterializedValue>, MaterializeError> {
    rows.iter().map(|r| decode_row(r, projection, registry)).collect()
}

fn decode_fields(
    source: &dyn ValueSource,
    fields: &[ProjectedField],
    prefix: &str,
    registry: &SchemaRegistry,
) -> Result<Vec<(String, MaterializedValue)>, MaterializeError> {
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let path = alias_path(prefix, &field.name);
        let value = match &field.node {
            ProjectionNode::Scalar { mapper, .. } => {
                let raw = source
                    .value_for(&path)
                    .ok_or_else(|| MaterializeError::MissingColumn(path.clone()))?;
                match raw {
                    DriverValue::Null => MaterializedValue::Null,
                    other => MaterializedValue::Scalar(map_from_driver(other, mapper.as_ref())),
                }
            }
            ProjectionNode::Object { fields } => {
                MaterializedValue::Object(decode_fields(source, fields, &path, registry)?)
            }
            ProjectionNode::Collection { child, terminal, .. } => {
                let raw = source
                    .value_for(&path)
                    .ok_or_else(|| MaterializeError::MissingColumn(path.clone()))?;
                decode_collection(&path, raw, terminal, child, registry)?
            }
        };
        out.push((field.name.clone(), value));
    }
    Ok(out)
}

fn alias_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}__{}", prefix, name)
    }
}

/// Decodes one collection field's aggregated driver value per its
/// terminal (spec.md §4.5 "Terminal decoding", §8 "Coalesce").
fn decode_collection(
    field_path: &str,
    raw: DriverValue,
    terminal: &CollectionTerminal,
    child: &crate::builder::plan::Plan,
    registry: &SchemaRegistry,
) -> Result<MaterializedValue, MaterializeError> {
    match terminal {
        CollectionTerminal::ToList | CollectionTerminal::SelectMany => {
            let items = json_array(field_path, raw)?;
            let child_projection = resolve_child_projection(child, registry)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let obj = json_object(field_path, &item)?;
                out.push(MaterializedValue::Object(decode_fields(
                    &JsonObjectSource(obj),
                    &child_projection,
                    "",
                    registry,
                )?));
            }
            Ok(MaterializedValue::Array(out))
        }
        CollectionTerminal::ToPrimitiveList => {
            let items = json_array(field_path, raw)?;
            let child_projection = resolve_child_projection(child, registry)?;
            let (leaf_alias, mapper) = primitive_leaf(field_path, &child_projection)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let obj = json_object(field_path, &item)?;
                let raw_leaf = obj
                    .get(&leaf_alias)
                    .map(json_to_driver_value)
                    .ok_or_else(|| MaterializeError::MissingColumn(leaf_alias.clone()))?;
                out.push(match raw_leaf {
                    DriverValue::Null => MaterializedValue::Null,
                    other => MaterializedValue::Scalar(map_from_driver(other, mapper.as_ref())),
                });
            }
            Ok(MaterializedValue::Array(out))
        }
        CollectionTerminal::FirstOrDefault => match raw {
            DriverValue::Null => Ok(MaterializedValue::Null),
            other => {
                let json = driver_value_as_json(field_path, other)?;
                if json.is_null() {
                    return Ok(MaterializedValue::Null);
                }
                let obj = json_object(field_path, &json)?;
                let child_projection = resolve_child_projection(child, registry)?;
                Ok(MaterializedValue::Object(decode_fields(
                    &JsonObjectSource(obj),
                    &child_projection,
                    "",
                    registry,
                )?))
            }
        },
        CollectionTerminal::Count => Ok(match raw {
            DriverValue::Null => MaterializedValue::Scalar(AppValue::Int(0)),
            other => MaterializedValue::Scalar(AppValue::from(other)),
        }),
        CollectionTerminal::Exists => Ok(match raw {
            DriverValue::Null => MaterializedValue::Scalar(AppValue::Bool(false)),
            other => MaterializedValue::Scalar(AppValue::from(other)),
        }),
        CollectionTerminal::Sum(_) | CollectionTerminal::Min(_) | CollectionTerminal::Max(_) => Ok(match raw {
            DriverValue::Null => MaterializedValue::Null,
            other => MaterializedValue::Scalar(AppValue::from(other)),
        }),
    }
}

fn resolve_child_projection(
    child: &crate::builder::plan::Plan,
    registry: &SchemaRegistry,
) -> Result<Vec<ProjectedField>, MaterializeError> {
    crate::emit::resolve_projection_for_decode(child, registry).map_err(|e| {
        MaterializeError::ChildProjectionResolution {
            field: child.root_alias.clone(),
            detail: e.to_string(),
        }
    })
}

fn primitive_leaf(
    field_path: &str,
    child_projection: &[ProjectedField],
) -> Result<(String, Option<Arc<dyn ValueMapper>>), MaterializeError> {
    let (alias, _expr, mapper) = ProjectedField::collect_scalar_aliases(child_projection, "")
        .into_iter()
        .next()
        .ok_or_else(|| MaterializeError::MissingPrimitiveLeaf(field_path.to_string()))?;
    Ok((alias, mapper))
}

fn driver_value_as_json(field_path: &str, value: DriverValue) -> Result<serde_json::Value, MaterializeError> {
    match value {
        DriverValue::Json(j) => Ok(j),
        DriverValue::Null => Ok(serde_json::Value::Null),
        DriverValue::Bool(b) => Ok(serde_json::Value::Bool(b)),
        DriverValue::Int(i) => Ok(serde_json::Value::from(i)),
        DriverValue::Float(f) => Ok(serde_json::json!(f)),
        DriverValue::Text(s) => Ok(serde_json::Value::String(s)),
        DriverValue::Bytes(_) => Err(MaterializeError::InvalidCollectionJson {
            column: field_path.to_string(),
            detail: "raw bytes cannot decode as a collection payload".to_string(),
        }),
    }
}

fn json_array(field_path: &str, value: DriverValue) -> Result<Vec<serde_json::Value>, MaterializeError> {
    match driver_value_as_json(field_path, value)? {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Null => Ok(Vec::new()),
        _ => Err(MaterializeError::ExpectedArray(field_path.to_string())),
    }
}

fn json_object(field_path: &str, value: &serde_json::Value) -> Result<&serde_json::Map<String, serde_json::Value>, MaterializeError> {
    value
        .as_object()
        .ok_or_else(|| MaterializeError::ExpectedObject(field_path.to_string()))
}
