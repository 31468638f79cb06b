//! Error types for schema registration and path resolution.
//!
//! Grounded on `graph_catalog::errors::GraphSchemaError`'s
//! context-helper pattern: each variant is paired with a `*_with_context`
//! constructor so callers can attach the operation that surfaced it.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("entity `{entity}` is already registered with a different descriptor")]
    ConflictingRegistration { entity: String },

    #[error("no entity descriptor registered for `{entity}`")]
    EntityNotFound { entity: String },

    #[error("entity `{entity}` has no property `{property}`")]
    PropertyNotFound { entity: String, property: String },

    #[error("entity `{entity}` has no navigation `{navigation}`")]
    NavigationNotFound { entity: String, navigation: String },

    #[error(
        "navigation `{navigation}` on `{entity}` has no inverse on `{target}` and no `is_inverse` marker; neither side owns the foreign-key columns"
    )]
    UnownedForeignKey {
        entity: String,
        navigation: String,
        target: String,
    },

    #[error("navigation `{navigation}` on `{entity}` declares a key tuple of length {left_len}, but its inverse on `{target}` declares length {right_len}")]
    KeyArityMismatch {
        entity: String,
        navigation: String,
        target: String,
        left_len: usize,
        right_len: usize,
    },
}

impl SchemaError {
    pub fn entity_not_found(entity: impl Into<String>) -> Self {
        SchemaError::EntityNotFound {
            entity: entity.into(),
        }
    }
}
