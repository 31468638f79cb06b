//! Errors for CTE composition (spec.md §4.6).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CteError {
    #[error("CTE name `{0}` is already registered in this statement")]
    DuplicateName(String),

    #[error("unknown CTE reference `{0}`")]
    UnknownReference(String),

    #[error(transparent)]
    Emit(#[from] Box<crate::emit::errors::EmitError>),
}
