//! Host-specific error types

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use shared::{ClientId, SharedError};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Server is already listening on {addr}")]
    AlreadyListening { addr: SocketAddr },

    #[error("Listening on {address} failed: {message}")]
    ListenFailed { address: String, message: String },

    #[error("Server cannot listen again after a failed or stopped listener")]
    ListenerUnavailable,

    #[error("Client not connected: {client_id}")]
    ClientNotFound { client_id: ClientId },

    #[error("No request arrived within {timeout:?}")]
    RequestTimeout { timeout: Duration },

    #[error("Client registry is no longer running")]
    RegistryUnavailable,

    #[error("Request handler error: {message}")]
    HandlerError { message: String },

    #[error("No async runtime available: {message}")]
    RuntimeUnavailable { message: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),
}

impl HostError {
    pub fn listen_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        HostError::ListenFailed {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        HostError::HandlerError {
            message: message.into(),
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;
