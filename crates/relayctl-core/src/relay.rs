//! Relay capability
//!
//! The controller never looks inside a relay. It only needs something it
//! can start (blocking until the connection ends) and close from another
//! task. Construction goes through a [`RelayFactory`] so the controller
//! stays independent of how a client or server relay is built.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SessionConfig;
use crate::events::EventSink;

/// Errors reported by a relay session or its factory
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay was closed")]
    Closed,

    #[error("Failed to launch relay: {0}")]
    Spawn(String),

    #[error("{}", exit_message(.0))]
    Exited(Option<i32>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid relay configuration: {0}")]
    InvalidConfig(String),
}

fn exit_message(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("Relay exited with status {code}"),
        None => "Relay terminated by signal".to_string(),
    }
}

/// One relay connection, client or server
///
/// `start` runs until the connection ends and may be called again for the
/// next attempt. `close` is idempotent and must make a pending `start`
/// return promptly.
#[async_trait]
pub trait RelaySession: Send + Sync {
    /// Run the relay until it disconnects or fails
    async fn start(&self) -> Result<(), RelayError>;

    /// Interrupt a pending `start` and refuse further attempts
    async fn close(&self);
}

/// Builds the relay variant selected by `config.role`
///
/// `sink` receives any log lines the relay itself produces, ordered with
/// the controller's own events.
pub trait RelayFactory: Send + Sync {
    fn create(
        &self,
        config: &SessionConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Arc<dyn RelaySession>, RelayError>;
}
