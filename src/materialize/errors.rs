//! Errors for row materialization (spec.md §4.8).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MaterializeError {
    #[error("result row has no column aliased `{0}`")]
    MissingColumn(String),

    #[error("column `{column}` aliased for a collection field did not decode as JSON: {detail}")]
    InvalidCollectionJson { column: String, detail: String },

    #[error("collection field `{0}` expected a JSON array but the driver returned a scalar")]
    ExpectedArray(String),

    #[error("collection field `{0}` expected a JSON object but the driver returned a scalar")]
    ExpectedObject(String),

    #[error("`to_primitive_list`/aggregate field `{0}` has no scalar leaf in its child projection")]
    MissingPrimitiveLeaf(String),

    #[error("failed to resolve the child projection for collection field `{field}`: {detail}")]
    ChildProjectionResolution { field: String, detail: String },
}
