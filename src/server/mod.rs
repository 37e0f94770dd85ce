//! Server Module
//!
//! Configuration, the accept loop, and the events the server reports to
//! whoever embeds it.
//!
//! ## Example
//!
//! ```ignore
//! use telnetctl::commands::default_table;
//! use telnetctl::server::{run, ServerConfig};
//! use std::sync::Arc;
//!
//! let config = ServerConfig::builder(default_table()?).port(2323).build();
//! run(Arc::new(config)).await?;
//! ```

pub mod config;
pub mod events;
pub mod listener;
pub mod settings;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use events::{CloseReason, ControlCommand, ServerEvent};
pub use listener::{bind, run, serve, ServerError};
pub use settings::{
    ConfigError, Settings, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LOG_NAME, DEFAULT_PORT,
    DEFAULT_READ_BUFFER_SIZE,
};
