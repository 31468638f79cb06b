//! Process-wide entity registry (spec.md §4.2).
//!
//! Grounded on `graph_catalog::graph_schema::GraphSchema`: built up once
//! at configuration time, then shared read-only via `Arc` across every
//! concurrent query execution (spec.md §5 "shared-resource policy").

use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::descriptor::{EntityDescriptor, KeyPart, NavigationDescriptor};
use crate::schema::errors::SchemaError;
use crate::schema::mapper::ValueMapper;

/// One join the planner will need to traverse a dotted property path
/// (spec.md §4.2 `resolve_path` contract).
#[derive(Debug, Clone)]
pub struct PathJoin {
    pub from_entity: String,
    pub navigation: String,
}

pub struct ResolvedPath {
    pub final_column: String,
    pub mapper: Option<Arc<dyn ValueMapper>>,
    pub join_chain: Vec<PathJoin>,
}

#[derive(Default)]
pub struct SchemaRegistry {
    entities: HashMap<String, Arc<EntityDescriptor>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent for identical descriptors; diverging re-registration is
    /// a `SchemaError::ConflictingRegistration` (spec.md §4.2 contract).
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<(), SchemaError> {
        self.validate_navigations(&descriptor)?;
        let name = descriptor.entity_name.clone();
        if let Some(existing) = self.entities.get(&name) {
            if !descriptors_equivalent(existing, &descriptor) {
                return Err(SchemaError::ConflictingRegistration { entity: name });
            }
            return Ok(());
        }
        self.entities.insert(name, Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, entity: &str) -> Result<Arc<EntityDescriptor>, SchemaError> {
        self.entities
            .get(entity)
            .cloned()
            .ok_or_else(|| SchemaError::entity_not_found(entity))
    }

    /// Follows a dotted property path (e.g. `post.user.last_active_at`),
    /// accumulating the joins the planner will need (spec.md §4.2).
    pub fn resolve_path(&self, entity: &str, path: &str) -> Result<ResolvedPath, SchemaError> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut current_entity = entity.to_string();
        let mut join_chain = Vec::new();

        for segment in &segments[..segments.len().saturating_sub(1)] {
            let descriptor = self.get(&current_entity)?;
            let nav = descriptor.navigation(segment).ok_or_else(|| {
                SchemaError::NavigationNotFound {
                    entity: current_entity.clone(),
                    navigation: segment.to_string(),
                }
            })?;
            join_chain.push(PathJoin {
                from_entity: current_entity.clone(),
                navigation: segment.to_string(),
            });
            current_entity = nav.target_entity.clone();
        }

        let last = segments.last().ok_or_else(|| SchemaError::PropertyNotFound {
            entity: entity.to_string(),
            property: path.to_string(),
        })?;
        let descriptor = self.get(&current_entity)?;
        let property = descriptor.property(last).ok_or_else(|| SchemaError::PropertyNotFound {
            entity: current_entity.clone(),
            property: last.to_string(),
        })?;

        Ok(ResolvedPath {
            final_column: property.column_name.clone(),
            mapper: property.value_mapper.clone(),
            join_chain,
        })
    }

    /// spec.md §3/§4.2 invariant: a navigation declared from side A to
    /// side B implies either a matching inverse on B, or an explicit
    /// `is_inverse` marker. Reject graphs where no side owns the FK
    /// columns, and reject key-tuple arity mismatches between partners.
    fn validate_navigations(&self, descriptor: &EntityDescriptor) -> Result<(), SchemaError> {
        for nav in &descriptor.navigations {
            if nav.is_inverse {
                // This side doesn't own the FK; the owning side is
                // responsible for emitting the constraint. Nothing further
                // to check without the target already registered, which
                // may not have happened yet (order-independent registration).
                continue;
            }
            if let Some(target) = self.entities.get(&nav.target_entity) {
                let has_inverse = target
                    .navigations
                    .iter()
                    .any(|back| back.target_entity == descriptor.entity_name && back.is_inverse);
                let is_standalone = target
                    .navigations
                    .iter()
                    .all(|back| back.target_entity != descriptor.entity_name);
                if !has_inverse && !is_standalone {
                    return Err(SchemaError::UnownedForeignKey {
                        entity: descriptor.entity_name.clone(),
                        navigation: nav.property_name.clone(),
                        target: nav.target_entity.clone(),
                    });
                }
                if let Some(back) = target
                    .navigations
                    .iter()
                    .find(|back| back.target_entity == descriptor.entity_name && back.is_inverse)
                {
                    check_key_arity(descriptor, nav, target.as_ref(), back)?;
                }
            }
        }
        Ok(())
    }
}

fn check_key_arity(
    entity: &EntityDescriptor,
    nav: &NavigationDescriptor,
    target: &EntityDescriptor,
    back: &NavigationDescriptor,
) -> Result<(), SchemaError> {
    if nav.key.len() != back.key.len() {
        return Err(SchemaError::KeyArityMismatch {
            entity: entity.entity_name.clone(),
            navigation: nav.property_name.clone(),
            target: target.entity_name.clone(),
            left_len: nav.key.len(),
            right_len: back.key.len(),
        });
    }
    Ok(())
}

/// Structural equivalence for idempotent re-registration. Two descriptors
/// are equivalent when their physical shape (table, columns, navigations)
/// matches; `ValueMapper` trait objects compare by `sql_type()` only,
/// since the functions themselves aren't `PartialEq`.
fn descriptors_equivalent(a: &EntityDescriptor, b: &EntityDescriptor) -> bool {
    a.table_name == b.table_name
        && a.schema_name == b.schema_name
        && a.properties.len() == b.properties.len()
        && a.properties.iter().zip(&b.properties).all(|(x, y)| {
            x.property_name == y.property_name
                && x.column_name == y.column_name
                && x.sql_type == y.sql_type
                && x.primary_key == y.primary_key
                && x.auto_increment == y.auto_increment
                && x.required == y.required
                && x.unique == y.unique
                && match (&x.value_mapper, &y.value_mapper) {
                    (Some(m1), Some(m2)) => m1.sql_type() == m2.sql_type(),
                    (None, None) => true,
                    _ => false,
                }
        })
        && a.navigations.len() == b.navigations.len()
        && a.navigations.iter().zip(&b.navigations).all(|(x, y)| {
            x.property_name == y.property_name
                && x.target_entity == y.target_entity
                && x.kind == y.kind
                && x.key == y.key
                && x.is_mandatory == y.is_mandatory
                && x.is_inverse == y.is_inverse
        })
}
