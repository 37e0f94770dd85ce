//! # telnetctl - A Line-Oriented Telnet Command Console
//!
//! telnetctl lets a long-running program expose a small operator console
//! over plain TCP. Connect with `telnet host port`, type a command, get an
//! answer. Commands are matched against an ordered table of regular
//! expressions and dispatched to handlers.
//!
//! ## Features
//!
//! - **Ordered Dispatch**: First matching pattern wins, so overlapping
//!   commands are resolved by their position in the table
//! - **Idle Timeout**: Silent sessions are closed by the server
//! - **Terminal Friendly**: Up arrow repeats the last command, `q` quits,
//!   Ctrl+D hangs up
//! - **Isolated Sessions**: A failing or panicking session never affects
//!   the others or the accept loop
//! - **Async I/O**: Built on Tokio, two lightweight tasks per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              telnetctl                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐  mpsc   ┌─────────────┐             │
//! │  │  Acceptor   │───>│   Reader    │────────>│  Analyzer   │             │
//! │  │ (Listener)  │    │ (read half) │<────────│(write half) │             │
//! │  └──────┬──────┘    └─────────────┘  stop   └──────┬──────┘             │
//! │         │                                          │                    │
//! │         ▼                                          ▼                    │
//! │  ┌─────────────┐                         ┌──────────────────┐           │
//! │  │ StatsStore  │<────────────────────────│  CommandTable    │           │
//! │  │ (counters)  │                         │ help│exit│stats… │           │
//! │  └─────────────┘                         └──────────────────┘           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use telnetctl::commands::{default_table, handler_fn, CommandEntry, Reply};
//! use telnetctl::server::{run, ServerConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let table = default_table()?.with(CommandEntry::new(
//!         "ping",
//!         r"^(?i)ping$",
//!         handler_fn(|_server, _msg| Ok(Reply::line("pong"))),
//!     )?);
//!
//!     let config = ServerConfig::builder(table)
//!         .port(2323)
//!         .idle_timeout(Duration::from_secs(600))
//!         .build();
//!
//!     run(Arc::new(config)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Line decoding, control bytes, and response framing
//! - [`commands`]: The command table, handler contract, and built-ins
//! - [`connection`]: Per-connection reader and analyzer tasks
//! - [`stats`]: Named concurrent counters
//! - [`server`]: Configuration, accept loop, and lifecycle events

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod stats;

// Re-export commonly used types for convenience
pub use commands::{default_table, CommandEntry, CommandHandler, CommandTable, Flow, HandlerError};
pub use connection::Connection;
pub use server::{run, ServerConfig, ServerError, ServerEvent, Settings};
pub use stats::{Counters, StatsStore};

/// Version of telnetctl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
