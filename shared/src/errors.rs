//! Shared error types for the engine link

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

impl SharedError {
    pub fn invalid_config(field: impl Into<String>, value: impl Into<String>) -> Self {
        SharedError::InvalidConfig {
            field: field.into(),
            value: value.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
