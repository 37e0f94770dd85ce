//! Command Analyzer
//!
//! Consumes the messages of one connection, in order, and dispatches each
//! one to the command table.
//!
//! ## Per Message
//!
//! ```text
//!   message ──> cursor-up? ──yes──> replace with previous message
//!                  │ no
//!                  └──────────> remember as previous
//!           ──> "q" / "Q"  ──> "exit"
//!           ──> first matching table entry
//!                  │
//!                  ├── none        write "bad command" notice, continue
//!                  ├── Continue    continue
//!                  ├── Terminate   signal stop, end task
//!                  └── Err         log, signal stop, end task
//! ```
//!
//! Only one handler runs at a time because the analyzer awaits each one
//! before taking the next message off the channel.

use crate::commands::Flow;
use crate::connection::Connection;
use crate::protocol::is_cursor_up;
use crate::server::ServerConfig;
use crate::stats::{COMMANDS_DISPATCHED, COMMANDS_REJECTED};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// The canonical exit command. `q`, `Q`, and end of stream all become this.
pub const EXIT_MESSAGE: &str = "exit";

/// Builds the notice sent back for a message no command matched.
pub fn bad_command_notice(msg: &str) -> String {
    format!("Bad command send!  - {} ", msg)
}

/// What the analyzer loop does after one message.
enum Step {
    Continue,
    Stop,
}

/// Sequential message processing and dispatch for one connection.
pub struct Analyzer {
    config: Arc<ServerConfig>,
    conn: Connection,
    messages: mpsc::Receiver<String>,
    stop: Option<oneshot::Sender<()>>,
    /// Last message that was not the repeat sequence
    previous: String,
    /// Messages received so far
    received: u64,
}

impl Analyzer {
    pub fn new(
        config: Arc<ServerConfig>,
        conn: Connection,
        messages: mpsc::Receiver<String>,
        stop: oneshot::Sender<()>,
    ) -> Self {
        Self {
            config,
            conn,
            messages,
            stop: Some(stop),
            previous: String::new(),
            received: 0,
        }
    }

    /// Processes messages until a handler stops the session or the reader
    /// drops its sender.
    ///
    /// Hands the connection back so the reader can close it.
    pub async fn run(mut self) -> Connection {
        while let Some(msg) = self.messages.recv().await {
            self.received += 1;
            debug!(count = self.received, message = %msg.escape_debug(), "Received message");

            let msg = self.normalize(msg);
            if let Step::Stop = self.dispatch(&msg).await {
                self.signal_stop();
                break;
            }
        }

        self.conn
    }

    /// Applies repeat-last and quit aliasing.
    fn normalize(&mut self, msg: String) -> String {
        let msg = if is_cursor_up(&msg) {
            self.previous.clone()
        } else {
            self.previous.clone_from(&msg);
            msg
        };

        if msg == "q" || msg == "Q" {
            EXIT_MESSAGE.to_string()
        } else {
            msg
        }
    }

    /// Runs the first matching command, if any.
    async fn dispatch(&mut self, msg: &str) -> Step {
        let config = Arc::clone(&self.config);

        let Some(entry) = config.commands.find(msg) else {
            info!(message = %msg.escape_debug(), "Unknown command");
            config.stats.increment(COMMANDS_REJECTED);
            if let Err(e) = self.conn.write_line(&bad_command_notice(msg)).await {
                warn!(error = %e, "Failed to write bad command notice");
            }
            return Step::Continue;
        };

        config.stats.increment(COMMANDS_DISPATCHED);
        debug!(command = %entry.name, "Dispatching command");

        match entry.handler.handle(&config, &mut self.conn, msg).await {
            Ok(Flow::Continue) => Step::Continue,
            Ok(Flow::Terminate) => {
                info!(command = %entry.name, "Client requested disconnect");
                Step::Stop
            }
            Err(e) => {
                error!(command = %entry.name, error = %e, "Command handler failed");
                Step::Stop
            }
        }
    }

    fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // The reader may already be gone (timeout); nothing to tell then.
            let _ = stop.send(());
        }
    }
}
