//! Crate-wide error types
//!
//! `AppError` covers every failure the controller surfaces to its caller.
//! Failures inside a running session never reach this type; the retry loop
//! turns them into log events instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relay::RelayError;

/// Controller error type
///
/// Serializable so an observer can forward it to another process unchanged.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    /// A session is already running
    #[error("Relay session is already running")]
    AlreadyRunning,

    /// The relay could not be constructed (unknown role, factory failure)
    #[error("Failed to create relay: {0}")]
    Construction(String),

    /// The relay configuration is incomplete
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    /// A relay attempt failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The operation is not allowed in the current controller state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Settings store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sled::Error> for AppError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::InvalidConfig(msg) | RelayError::Spawn(msg) => Self::Construction(msg),
            other => Self::Connection(other.to_string()),
        }
    }
}
