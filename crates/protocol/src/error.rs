use serde::Serialize;
use thiserror::Error;

/// A request parameter failed validation before entering the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("invalid `{field}`: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
