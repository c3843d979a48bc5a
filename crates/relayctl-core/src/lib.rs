//! relayctl Core Library
//!
//! Lifecycle control for a client or server relay process. This crate
//! provides the pieces that are independent of any front end:
//!
//! # Modules
//!
//! - [`controller`] - Session controller and its retry loop
//! - [`events`] - Ordered event channel and observers
//! - [`relay`] - Relay session capability and factory traits
//! - [`process`] - Relay backed by an external executable
//! - [`config`] - Roles and relay configuration files
//! - [`settings`] - Persistent controller settings
//! - [`status`] - Status text and control availability
//! - [`error`] - Error types

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod process;
pub mod relay;
pub mod settings;
pub mod status;

// Re-export commonly used types
pub use config::{generate_verify_key, RelayConfig, Role, SessionConfig};
pub use controller::{ControllerState, RetryPolicy, SessionController};
pub use error::{AppError, Result};
pub use events::{EventSink, LogBuffer, LogEvent, LogObserver, Severity, StdoutObserver};
pub use process::{ProcessRelay, ProcessRelayFactory};
pub use relay::{RelayError, RelayFactory, RelaySession};
pub use settings::{AppSettings, SettingsStore};
pub use status::{caption, describe, status_line, Controls};
