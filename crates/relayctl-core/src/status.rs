//! Human-readable status derived from role and configuration
//!
//! Everything here is a pure function of its inputs so the same text can
//! be used for the start announcement, a status label, or a tray hint.

use crate::config::{RelayConfig, Role};
use crate::controller::ControllerState;

/// Status lines announced when a session starts
pub fn describe(role: Role, config: &RelayConfig) -> Vec<String> {
    let mut lines = Vec::with_capacity(3);
    match role {
        Role::Client => {
            lines.push(format!(
                "Client started, connecting to server {} on port {}",
                config.client.svr_addr, config.tcp_port
            ));
            if config.is_https {
                lines.push("Forwarding to an HTTPS service".to_string());
            }
            lines.push(format!(
                "Forwarding to local HTTP(S) port {}",
                config.client.http_port
            ));
        }
        Role::Server => {
            lines.push(format!(
                "TCP server listening on port {}",
                config.tcp_port
            ));
            if config.is_https {
                lines.push("HTTP service is served over HTTPS".to_string());
            }
            lines.push(format!(
                "HTTP(S) server listening on port {}",
                config.server.http_port
            ));
        }
    }
    lines
}

/// Single-line form of [`describe`]
pub fn status_line(role: Role, config: &RelayConfig) -> String {
    describe(role, config).join("; ")
}

/// Window/tray caption for the selected role
pub fn caption(role: Role) -> String {
    format!("rproxy[{role}]")
}

/// Which user actions are available in a controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    /// Relay configuration and role may be edited
    pub settings_editable: bool,
}

impl Controls {
    pub fn for_state(state: ControllerState) -> Self {
        let idle = state == ControllerState::Idle;
        Self {
            start_enabled: idle,
            stop_enabled: !idle,
            settings_editable: idle,
        }
    }
}
