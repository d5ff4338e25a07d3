//! Shared error types for configuration values

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Unknown component: {name}")]
    UnknownComponent { name: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
