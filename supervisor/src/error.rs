//! Supervisor error types

use thiserror::Error;

/// Result type for supervisor operations
pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn {path}: {message}")]
    SpawnFailed { path: String, message: String },

    #[error("Process {pid} could not be terminated: {message}")]
    TerminateFailed { pid: u32, message: String },

    #[error("Invalid output mode: {value}")]
    InvalidOutputMode { value: String },
}

impl SupervisorError {
    pub fn spawn_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        SupervisorError::SpawnFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn terminate_failed(pid: u32, message: impl Into<String>) -> Self {
        SupervisorError::TerminateFailed {
            pid,
            message: message.into(),
        }
    }
}
