//! File-based Server Settings
//!
//! Everything a deployment tunes without recompiling: where to listen,
//! how long idle sessions live, and how the log is named. The command
//! table itself is code and never comes from this file.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 2323
//! idle_timeout_secs = 600
//! read_buffer_size = 1024
//! log_name = "telnet"
//! prefix = "[Telnet]: "
//! ```

use crate::protocol::DEFAULT_PREFIX;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// The default port the console listens on
pub const DEFAULT_PORT: u16 = 2323;

/// The default host the console binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default seconds of client silence before a session is closed
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default size of the per-connection read buffer
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default log name
pub const DEFAULT_LOG_NAME: &str = "telnet";

/// Errors loading the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server settings as read from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub idle_timeout_secs: u64,
    pub read_buffer_size: usize,
    pub log_name: String,
    pub prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            log_name: DEFAULT_LOG_NAME.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file. Missing keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
