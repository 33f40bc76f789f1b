//! Error types for schema filtering

use thiserror::Error;

use crate::schema::FieldKind;

/// Result type for filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// A raw value has no conversion path to the requested kind
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {found} to {target}: {reason}")]
pub struct ConversionError {
    /// Kind the value was being converted to
    pub target: FieldKind,
    /// Runtime type of the offending value
    pub found: &'static str,
    /// Human readable detail
    pub reason: String,
}

impl ConversionError {
    pub(crate) fn new(target: FieldKind, found: &'static str, reason: impl Into<String>) -> Self {
        Self {
            target,
            found,
            reason: reason.into(),
        }
    }
}

/// Filter errors
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("missing required field: {field}")]
    RequiredField { field: String },

    #[error("shape mismatch on field {field}: {message}")]
    Shape { field: String, message: String },

    #[error("field {field}: {source}")]
    Conversion {
        field: String,
        #[source]
        source: ConversionError,
    },

    #[error("value '{value}' of field {field} does not match pattern {pattern}")]
    Match {
        field: String,
        value: String,
        pattern: String,
    },

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("maximum schema nesting depth of {limit} exceeded")]
    DepthExceeded { limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FilterError {
    /// Field path the error refers to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            FilterError::RequiredField { field }
            | FilterError::Shape { field, .. }
            | FilterError::Conversion { field, .. }
            | FilterError::Match { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Prefix the field path with the parent field it was raised under
    pub(crate) fn within(mut self, parent: &str) -> Self {
        match &mut self {
            FilterError::RequiredField { field }
            | FilterError::Shape { field, .. }
            | FilterError::Conversion { field, .. }
            | FilterError::Match { field, .. } => {
                *field = format!("{}.{}", parent, field);
            }
            _ => {}
        }
        self
    }
}
