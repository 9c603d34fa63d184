//! Server configuration.
//!
//! Settings come from three layers, later ones winning:
//! built-in defaults, an optional TOML file, then CLI flags/env vars
//! applied by the binary.
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 8080
//! max_sessions = 100
//! max_line_length = 4096
//! handshake_timeout_secs = 30
//! write_timeout_secs = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address (all interfaces)
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default maximum number of concurrently connected participants
pub const DEFAULT_MAX_SESSIONS: usize = 100;

/// Default maximum length of one received line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Origin reported for TOML parsed from a string rather than a file
const INLINE_ORIGIN: &str = "<inline>";

/// Settings for a [`ChatServer`](crate::ChatServer).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: String,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Maximum number of participants connected at once
    pub max_sessions: usize,

    /// Longest line accepted from a client, excluding the terminator
    pub max_line_length: usize,

    /// How long a new connection may take to send its name
    pub handshake_timeout_secs: u64,

    /// Bound on a single write to one participant
    pub write_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            handshake_timeout_secs: 30,
            write_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Loads settings from a TOML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            origin: path.display().to_string(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses settings from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            origin: INLINE_ORIGIN.to_string(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings under which no client could ever join or be served.
    ///
    /// Called by the loaders; call it again after applying overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("max_sessions", self.max_sessions == 0),
            ("max_line_length", self.max_line_length == 0),
            ("handshake_timeout_secs", self.handshake_timeout_secs == 0),
            ("write_timeout_secs", self.write_timeout_secs == 0),
        ];
        match zero.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field,
                reason: "must be greater than zero",
            }),
            None => Ok(()),
        }
    }

    /// Defaults bound to an ephemeral port on loopback. Used by tests.
    pub fn local_ephemeral() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }

    /// `bind_address:port`, as used in log lines and errors.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {error}", .path.display())]
    Read { path: PathBuf, error: String },

    #[error("Invalid config in {origin}: {error}")]
    Parse { origin: String, error: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
