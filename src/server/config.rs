//! Server Configuration
//!
//! A [`ServerConfig`] is built once, wrapped in an `Arc`, and shared by the
//! acceptor and every connection task. Nothing in it changes after
//! [`ServerConfigBuilder::build`] except the counters inside the stats
//! store.

use crate::commands::CommandTable;
use crate::protocol::DEFAULT_PREFIX;
use crate::server::events::ServerEvent;
use crate::server::settings::{
    Settings, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LOG_NAME, DEFAULT_PORT,
    DEFAULT_READ_BUFFER_SIZE,
};
use crate::stats::{Counters, StatsStore};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, Dispatch};

/// Everything the server needs to run.
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,
    /// Client silence after which a session is closed
    pub idle_timeout: Duration,
    /// Size of the per-connection read buffer
    pub read_buffer_size: usize,
    /// Name attached to every session span and used for the log file
    pub log_name: String,
    /// Prefix written in front of every response line
    pub prefix: String,
    /// Ordered command table
    pub commands: CommandTable,
    /// Shared statistics store
    pub stats: Arc<dyn StatsStore>,
    /// Where lifecycle events go, if anyone listens
    pub events: Option<mpsc::Sender<ServerEvent>>,
    /// Log sink every server task runs under
    pub log: Dispatch,
    started_at: Instant,
}

impl ServerConfig {
    /// Starts building a configuration around a command table.
    pub fn builder(commands: CommandTable) -> ServerConfigBuilder {
        ServerConfigBuilder::new(commands)
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Time since this configuration was built.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Sends a lifecycle event without waiting.
    ///
    /// Returns false if no channel is configured or the event was dropped
    /// because the channel is full or closed.
    pub fn emit(&self, event: ServerEvent) -> bool {
        let Some(events) = &self.events else {
            return false;
        };

        match events.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Dropped server event");
                false
            }
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("idle_timeout", &self.idle_timeout)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("log_name", &self.log_name)
            .field("prefix", &self.prefix)
            .field("commands", &self.commands)
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServerConfig`].
///
/// # Example
///
/// ```
/// use telnetctl::commands::CommandTable;
/// use telnetctl::server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::builder(CommandTable::new())
///     .port(0)
///     .idle_timeout(Duration::from_secs(30))
///     .build();
/// assert_eq!(config.bind_address(), "127.0.0.1:0");
/// ```
pub struct ServerConfigBuilder {
    host: String,
    port: u16,
    idle_timeout: Duration,
    read_buffer_size: usize,
    log_name: String,
    prefix: String,
    commands: CommandTable,
    stats: Option<Arc<dyn StatsStore>>,
    events: Option<mpsc::Sender<ServerEvent>>,
    log: Option<Dispatch>,
}

impl ServerConfigBuilder {
    fn new(commands: CommandTable) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            log_name: DEFAULT_LOG_NAME.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            commands,
            stats: None,
            events: None,
            log: None,
        }
    }

    /// Copies every file setting onto the builder.
    pub fn settings(self, settings: &Settings) -> Self {
        self.host(settings.host.clone())
            .port(settings.port)
            .idle_timeout(settings.idle_timeout())
            .read_buffer_size(settings.read_buffer_size)
            .log_name(settings.log_name.clone())
            .prefix(settings.prefix.clone())
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets the read buffer size. Values below 1 are raised to 1.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn log_name(mut self, log_name: impl Into<String>) -> Self {
        self.log_name = log_name.into();
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Uses a shared statistics store instead of a private [`Counters`].
    pub fn stats(mut self, stats: Arc<dyn StatsStore>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Delivers lifecycle events to `events`.
    pub fn events(mut self, events: mpsc::Sender<ServerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Runs every server task under `dispatch` instead of the default
    /// subscriber current at [`build`](Self::build) time.
    pub fn log_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.log = Some(dispatch);
        self
    }

    pub fn build(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            idle_timeout: self.idle_timeout,
            read_buffer_size: self.read_buffer_size,
            log_name: self.log_name,
            prefix: self.prefix,
            commands: self.commands,
            stats: self.stats.unwrap_or_else(|| Arc::new(Counters::new())),
            events: self.events,
            log: self
                .log
                .unwrap_or_else(|| tracing::dispatcher::get_default(|d| d.clone())),
            started_at: Instant::now(),
        }
    }
}
