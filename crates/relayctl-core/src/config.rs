//! Relay roles and configuration
//!
//! `RelayConfig` is the on-disk relay configuration (JSON). The controller
//! only ever sees it through a [`SessionConfig`] snapshot taken when a
//! session starts, so edits made while a session runs cannot leak into it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Default relay tunnel port
pub const DEFAULT_TCP_PORT: u16 = 8888;

/// Default local HTTP port a client forwards to
pub const DEFAULT_CLIENT_HTTP_PORT: u16 = 80;

/// Default public HTTP port a server listens on
pub const DEFAULT_SERVER_HTTP_PORT: u16 = 8080;

const VERIFY_KEY_LEN: usize = 16;
const VERIFY_KEY_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Which side of the relay this process runs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Server,
}

impl Role {
    /// Map a persisted mode index (0 = client, 1 = server)
    pub fn from_index(index: i32) -> Result<Self> {
        match index {
            0 => Ok(Role::Client),
            1 => Ok(Role::Server),
            other => Err(AppError::Construction(format!("unrecognized role index {other}"))),
        }
    }

    pub fn index(self) -> i32 {
        match self {
            Role::Client => 0,
            Role::Server => 1,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "server" => Ok(Role::Server),
            other => Err(AppError::Construction(format!("unrecognized role '{other}'"))),
        }
    }
}

/// Client-only relay settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay server address to connect to
    pub svr_addr: String,
    /// Local HTTP(S) port requests are forwarded to
    pub http_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            svr_addr: String::new(),
            http_port: DEFAULT_CLIENT_HTTP_PORT,
        }
    }
}

/// Server-only relay settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Public HTTP(S) port
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_SERVER_HTTP_PORT,
        }
    }
}

/// Relay configuration as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub tcp_port: u16,
    pub verify_key: String,
    pub is_zip: bool,
    pub is_https: bool,
    pub tls_ca_file: String,
    pub tls_cert_file: String,
    pub tls_key_file: String,
    pub client: ClientConfig,
    pub server: ServerConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tcp_port: DEFAULT_TCP_PORT,
            verify_key: String::new(),
            is_zip: false,
            is_https: false,
            tls_ca_file: String::new(),
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .map_err(|e| AppError::Io(format!("Failed to read {}: {e}", path.display())))?;
        let config = serde_json::from_slice(&bytes)?;
        Ok(config)
    }

    /// Save the configuration, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes)
            .map_err(|e| AppError::Io(format!("Failed to write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| AppError::Io(format!("Failed to replace {}: {e}", path.display())))?;

        tracing::debug!("Saved relay config to {}", path.display());
        Ok(())
    }

    /// Check that every field the given role needs is present
    pub fn validate(&self, role: Role) -> Result<()> {
        if self.verify_key.trim().is_empty() {
            return Err(AppError::ConfigValidation(
                "a verify key is required".to_string(),
            ));
        }
        if role == Role::Client && self.client.svr_addr.trim().is_empty() {
            return Err(AppError::ConfigValidation(
                "the server address to connect to must not be empty".to_string(),
            ));
        }
        if self.is_https
            && (self.tls_cert_file.trim().is_empty() || self.tls_key_file.trim().is_empty())
        {
            return Err(AppError::ConfigValidation(
                "HTTPS requires both a TLS certificate and key file".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder method for a fresh verify key
    pub fn with_random_key(mut self) -> Self {
        self.verify_key = generate_verify_key();
        self
    }
}

/// Generate a random 16 character verify key
pub fn generate_verify_key() -> String {
    let mut rng = rand::thread_rng();
    (0..VERIFY_KEY_LEN)
        .map(|_| VERIFY_KEY_CHARSET[rng.gen_range(0..VERIFY_KEY_CHARSET.len())] as char)
        .collect()
}

/// Immutable snapshot handed to the relay factory when a session starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub role: Role,
    pub relay: RelayConfig,
    /// File the relay configuration was loaded from, if any
    pub config_path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(role: Role, relay: RelayConfig) -> Self {
        Self {
            role,
            relay,
            config_path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_client_config() -> RelayConfig {
        RelayConfig {
            verify_key: "secret".to_string(),
            client: ClientConfig {
                svr_addr: "relay.example.com".to_string(),
                http_port: 3000,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_role_display_and_parse() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Server.to_string(), "server");
        assert_eq!("Server".parse::<Role>().unwrap(), Role::Server);
        assert!(matches!(
            "bridge".parse::<Role>(),
            Err(AppError::Construction(_))
        ));
    }

    #[test]
    fn test_role_index_mapping() {
        assert_eq!(Role::from_index(0).unwrap(), Role::Client);
        assert_eq!(Role::from_index(1).unwrap(), Role::Server);
        assert_eq!(Role::Server.index(), 1);
        assert!(Role::from_index(-1).is_err());
        assert!(Role::from_index(2).is_err());
    }

    #[test]
    fn test_validate_requires_verify_key() {
        let config = RelayConfig {
            verify_key: String::new(),
            ..valid_client_config()
        };
        assert!(matches!(
            config.validate(Role::Client),
            Err(AppError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_validate_server_address_only_for_client() {
        let mut config = valid_client_config();
        config.client.svr_addr.clear();

        assert!(config.validate(Role::Client).is_err());
        assert!(config.validate(Role::Server).is_ok());
    }

    #[test]
    fn test_validate_https_needs_cert_and_key() {
        let mut config = valid_client_config();
        config.is_https = true;
        config.tls_cert_file = "cert.pem".to_string();
        assert!(config.validate(Role::Client).is_err());

        config.tls_key_file = "key.pem".to_string();
        assert!(config.validate(Role::Client).is_ok());
    }

    #[test]
    fn test_generate_verify_key() {
        let key = generate_verify_key();
        assert_eq!(key.len(), 16);
        assert!(key.bytes().all(|b| VERIFY_KEY_CHARSET.contains(&b)));
        assert_ne!(generate_verify_key(), generate_verify_key());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.json");

        let config = valid_client_config();
        config.save(&path).unwrap();

        let loaded = RelayConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!dir.path().join("relay.json.tmp").exists());
    }

    #[test]
    fn test_load_fills_missing_fields_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{"verify_key":"k","client":{"svr_addr":"a"}}"#).unwrap();

        let loaded = RelayConfig::load(&path).unwrap();
        assert_eq!(loaded.tcp_port, DEFAULT_TCP_PORT);
        assert_eq!(loaded.client.http_port, DEFAULT_CLIENT_HTTP_PORT);
        assert_eq!(loaded.server.http_port, DEFAULT_SERVER_HTTP_PORT);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = RelayConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
