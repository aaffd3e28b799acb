//! Error types for the filter compiler
//!
//! Parsing and compilation are fail-soft and never return these; they surface
//! from input loading, catalog validation and structural tree edits.

use thiserror::Error;

/// Main error type for the filter compiler
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid variable: {0}")]
    InvalidVariable(String),

    #[error("Invalid list variable: {0}")]
    InvalidListVariable(String),

    #[error("List variable name collides with schema field: {0}")]
    NameCollision(String),

    #[error("Variable references itself through {0}")]
    CyclicVariable(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node is not a block: {0}")]
    NotABlock(String),

    #[error("Node is not a condition: {0}")]
    NotACondition(String),
}

impl From<serde_json::Error> for FilterError {
    fn from(err: serde_json::Error) -> Self {
        FilterError::DeserializationError(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<FilterError> for pyo3::PyErr {
    fn from(err: FilterError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyKeyError, PyValueError};

        match err {
            FilterError::NodeNotFound(id) => PyKeyError::new_err(format!("Node not found: {}", id)),
            other => PyValueError::new_err(other.to_string()),
        }
    }
}

/// Result type alias for the filter compiler
pub type Result<T> = std::result::Result<T, FilterError>;
