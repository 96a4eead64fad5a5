//! Error types for the tabula-ml crate.

use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unseen category '{value}' in column '{column}'")]
    UnseenCategory { column: String, value: String },

    #[error("Missing value in column '{column}' for record {record}")]
    MissingValue { column: String, record: usize },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn unseen_category(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnseenCategory {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn missing_value(column: impl Into<String>, record: usize) -> Self {
        Self::MissingValue {
            column: column.into(),
            record,
        }
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }
}
