//! Lifecycle events surfaced to the embedding program.

use std::fmt;
use std::net::SocketAddr;

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent nothing for longer than the idle timeout
    IdleTimeout,
    /// A command asked to end the session, or a handler failed
    Stopped,
    /// The client closed its side or sent end-of-transmission
    EndOfStream,
    /// The connection task panicked
    Panicked,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::Stopped => "stopped",
            CloseReason::EndOfStream => "end of stream",
            CloseReason::Panicked => "panicked",
        };
        f.write_str(reason)
    }
}

/// A control command a handler forwards to the embedding program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Events delivered on the configured event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    ConnectionEstablished { addr: SocketAddr },
    ConnectionClosed { addr: SocketAddr, reason: CloseReason },
    Command(ControlCommand),
}
