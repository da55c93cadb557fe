//! Client error types

use std::time::Duration;
use thiserror::Error;
use shared::SharedError;

use crate::state::ConnectionState;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Handshake with {url} not complete after {attempts} attempts (state: {state})")]
    HandshakeTimeout {
        url: String,
        attempts: u32,
        state: ConnectionState,
    },

    #[error("Connection is not open (state: {state})")]
    NotConnected { state: ConnectionState },

    #[error("No response within {timeout:?}")]
    ReceiveTimeout { timeout: Duration },

    #[error("Connection closed before the response arrived")]
    ConnectionClosed,

    #[error("Invalid endpoint: {message}")]
    InvalidEndpoint { message: String },

    #[error("Transport error: {message}")]
    TransportError { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        ClientError::TransportError {
            message: message.into(),
        }
    }

    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        ClientError::InvalidEndpoint {
            message: message.into(),
        }
    }

    /// Whether the caller may simply try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::HandshakeTimeout { .. }
                | ClientError::ReceiveTimeout { .. }
                | ClientError::ConnectionClosed
                | ClientError::NotConnected { .. }
        )
    }
}
