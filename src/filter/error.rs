use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("proper filter query needed: unknown field '{0}'")]
    UnknownField(String),

    #[error("proper order query needed: unknown field '{0}'")]
    UnknownSortField(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid sorts: {0}")]
    InvalidSorts(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    #[error("Invalid offset: {0}")]
    InvalidOffset(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
