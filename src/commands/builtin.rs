//! Built-in Commands
//!
//! A ready-made command table for the console binary. Embedding programs
//! can start from [`default_table`] and append their own entries, or pick
//! individual handlers.
//!
//! | Command       | Effect                                         |
//! |---------------|------------------------------------------------|
//! | `help`, `?`   | List every command in the table                |
//! | `exit`, `quit`| Say goodbye and close the session              |
//! | `stats`       | Dump the statistics store                      |
//! | `uptime`      | Seconds since the server was configured        |
//! | `time`        | Server time (Unix seconds)                     |
//! | `echo <text>` | Write `<text>` back                            |
//! | `send <name>` | Forward a control command to the host program  |

use crate::commands::table::{
    handler_fn, CommandEntry, CommandHandler, CommandTable, Flow, HandlerError, HandlerResult,
    Reply,
};
use crate::connection::Connection;
use crate::server::{ControlCommand, ServerConfig, ServerEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Writes the command menu.
pub struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn handle(
        &self,
        server: &ServerConfig,
        conn: &mut Connection,
        _msg: &str,
    ) -> HandlerResult {
        let width = server
            .commands
            .iter()
            .map(|entry| entry.name.len())
            .max()
            .unwrap_or(0);

        let mut lines = Vec::with_capacity(server.commands.len() + 1);
        lines.push("Available commands:".to_string());
        for entry in server.commands.iter() {
            lines.push(format!(
                "  {:<width$} - {}",
                entry.name,
                entry.description,
                width = width
            ));
        }

        conn.write_lines(&lines).await?;
        Ok(Flow::Continue)
    }
}

/// Says goodbye and ends the session.
pub struct Exit;

#[async_trait]
impl CommandHandler for Exit {
    async fn handle(
        &self,
        _server: &ServerConfig,
        conn: &mut Connection,
        _msg: &str,
    ) -> HandlerResult {
        // The client may already be gone (EOF path); leaving is all that matters.
        if let Err(e) = conn.write_line("Bye!").await {
            debug!(client = %conn.peer_addr(), error = %e, "Could not send goodbye");
        }
        Ok(Flow::Terminate)
    }
}

fn stats(server: &ServerConfig, _msg: &str) -> Result<Reply, HandlerError> {
    let snapshot = server.stats.snapshot();
    if snapshot.is_empty() {
        return Ok(Reply::line("no statistics collected"));
    }
    Ok(Reply::lines(
        snapshot
            .into_iter()
            .map(|(name, value)| format!("{} = {}", name, value)),
    ))
}

fn uptime(server: &ServerConfig, _msg: &str) -> Result<Reply, HandlerError> {
    Ok(Reply::line(format!("uptime {}s", server.uptime().as_secs())))
}

fn time(_server: &ServerConfig, _msg: &str) -> Result<Reply, HandlerError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| HandlerError::Failed(format!("system clock before Unix epoch: {}", e)))?;
    Ok(Reply::line(format!("time {}", now.as_secs())))
}

/// Returns the text after the first word.
fn arguments(msg: &str) -> &str {
    msg.split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

fn echo(_server: &ServerConfig, msg: &str) -> Result<Reply, HandlerError> {
    Ok(Reply::line(arguments(msg)))
}

fn send(server: &ServerConfig, msg: &str) -> Result<Reply, HandlerError> {
    let mut words = arguments(msg).split_whitespace();
    let name = words
        .next()
        .ok_or_else(|| HandlerError::InvalidArgument("missing command name".into()))?;

    if server.events.is_none() {
        return Err(HandlerError::Failed("no event channel configured".into()));
    }

    let command = ControlCommand {
        name: name.to_string(),
        args: words.map(str::to_string).collect(),
    };

    if server.emit(ServerEvent::Command(command)) {
        Ok(Reply::line(format!("sent {}", name)))
    } else {
        Ok(Reply::line(format!("dropped {} (event queue full)", name)))
    }
}

/// Builds the default command table, in matching order.
pub fn default_table() -> Result<CommandTable, regex::Error> {
    let entries = [
        CommandEntry::new("help", r"^(?i)(help|\?|h)$", Arc::new(Help))?
            .describe("show this menu"),
        CommandEntry::new("exit", r"^(?i)(exit|quit)$", Arc::new(Exit))?
            .describe("close the connection (also q)"),
        CommandEntry::new("stats", r"^(?i)stats$", handler_fn(stats))?
            .describe("show server counters"),
        CommandEntry::new("uptime", r"^(?i)uptime$", handler_fn(uptime))?
            .describe("show server uptime"),
        CommandEntry::new("time", r"^(?i)time$", handler_fn(time))?
            .describe("show server time (Unix seconds)"),
        CommandEntry::new("echo", r"^(?i)echo\s+.+$", handler_fn(echo))?
            .describe("echo <text>: write text back"),
        CommandEntry::new("send", r"^(?i)send\s+\S+", handler_fn(send))?
            .describe("send <name> [args..]: forward a control command"),
    ];

    Ok(entries.into_iter().collect())
}
