//! Command Table
//!
//! The table is an ordered list of `(name, pattern, handler)` entries.
//! Matching is first-match-wins: entries are scanned in declared order and
//! the first pattern that matches the message is the only one that runs.
//! Entry order is part of the configuration, so overlapping patterns are
//! allowed and resolved by position.
//!
//! ## Handler Contract
//!
//! ```text
//!   handle(server, connection, message)
//!        │
//!        ├── Ok(Flow::Continue)   keep the session going
//!        ├── Ok(Flow::Terminate)  stop the session (e.g. `exit`)
//!        └── Err(HandlerError)    log it and stop the session
//! ```
//!
//! Handlers are awaited one at a time per connection, in message order.

use crate::connection::Connection;
use crate::server::ServerConfig;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// What the session should do after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Wait for the next message
    Continue,
    /// Close the connection
    Terminate,
}

/// Errors a command handler can report.
///
/// Any error ends the session. The detail is logged on the server side;
/// the client only sees what the handler wrote before failing.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Writing to the client failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message matched but its arguments are unusable
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

/// Result type returned by command handlers.
pub type HandlerResult = Result<Flow, HandlerError>;

/// The behavior bound to one command pattern.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command.
    ///
    /// # Arguments
    ///
    /// * `server` - The server configuration (command table, stats, events)
    /// * `conn` - The write side of the originating connection
    /// * `msg` - The message that matched, after normalization
    async fn handle(&self, server: &ServerConfig, conn: &mut Connection, msg: &str)
        -> HandlerResult;
}

/// Lines to send back from a synchronous handler, plus what to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub flow: Flow,
}

impl Reply {
    /// A reply with no output.
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            flow: Flow::Continue,
        }
    }

    /// A single-line reply.
    pub fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            flow: Flow::Continue,
        }
    }

    /// A multi-line reply.
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            flow: Flow::Continue,
        }
    }

    /// Marks the reply as the last one of the session.
    pub fn terminate(mut self) -> Self {
        self.flow = Flow::Terminate;
        self
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&ServerConfig, &str) -> Result<Reply, HandlerError> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        server: &ServerConfig,
        conn: &mut Connection,
        msg: &str,
    ) -> HandlerResult {
        let reply = (self.0)(server, msg)?;
        if !reply.lines.is_empty() {
            conn.write_lines(&reply.lines).await?;
        }
        Ok(reply.flow)
    }
}

/// Adapts a synchronous closure into a [`CommandHandler`].
///
/// The reply lines are written to the connection before the flow is
/// reported back.
///
/// # Example
///
/// ```
/// use telnetctl::commands::{handler_fn, CommandEntry, Reply};
///
/// let entry = CommandEntry::new(
///     "ping",
///     r"^(?i)ping$",
///     handler_fn(|_server, _msg| Ok(Reply::line("pong"))),
/// )
/// .unwrap();
/// assert!(entry.matches("PING"));
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(&ServerConfig, &str) -> Result<Reply, HandlerError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// One row of the command table.
#[derive(Clone)]
pub struct CommandEntry {
    /// Name used in logs and in the help menu
    pub name: String,
    /// Pattern the whole message is matched against
    pub pattern: Regex,
    /// One-line help text
    pub description: String,
    /// The behavior to run on a match
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandEntry {
    /// Creates an entry, compiling `pattern`.
    ///
    /// Patterns are regular expressions searched within the message; anchor
    /// them (`^...$`) when the whole message has to match.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
            description: String::new(),
            handler,
        })
    }

    /// Sets the help text shown by the `help` command.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[inline]
    pub fn matches(&self, msg: &str) -> bool {
        self.pattern.is_match(msg)
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The ordered command table.
///
/// Read-only once the server is built; every connection scans the same
/// table without synchronization.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry. Later entries lose to earlier ones on overlap.
    pub fn push(&mut self, entry: CommandEntry) {
        self.entries.push(entry);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, entry: CommandEntry) -> Self {
        self.push(entry);
        self
    }

    /// Returns the first entry whose pattern matches `msg`.
    ///
    /// This is a linear scan on purpose: position decides between
    /// overlapping patterns.
    pub fn find(&self, msg: &str) -> Option<&CommandEntry> {
        self.entries.iter().find(|entry| entry.matches(msg))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CommandEntry> for CommandTable {
    fn from_iter<T: IntoIterator<Item = CommandEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use std::net::SocketAddr;
    use tokio_test::io::Builder;

    fn noop(name: &str, pattern: &str) -> CommandEntry {
        CommandEntry::new(name, pattern, handler_fn(|_, _| Ok(Reply::empty()))).unwrap()
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let table = CommandTable::new()
            .with(noop("status-all", r"^status"))
            .with(noop("status-one", r"^status \w+$"));

        assert_eq!(table.find("status db").unwrap().name, "status-all");
        assert_eq!(table.find("status").unwrap().name, "status-all");
    }

    #[test]
    fn test_order_is_preserved() {
        let table = CommandTable::new()
            .with(noop("status-one", r"^status \w+$"))
            .with(noop("status-all", r"^status"));

        assert_eq!(table.find("status db").unwrap().name, "status-one");
        assert_eq!(table.find("status").unwrap().name, "status-all");

        let names: Vec<&str> = table.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["status-one", "status-all"]);
    }

    #[test]
    fn test_no_match() {
        let table = CommandTable::new().with(noop("help", r"^help$"));
        assert!(table.find("zzz").is_none());
        assert!(CommandTable::new().find("help").is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        let result = CommandEntry::new("broken", r"^(unclosed", handler_fn(|_, _| Ok(Reply::empty())));
        assert!(result.is_err());
    }

    #[test]
    fn test_describe() {
        let entry = noop("help", r"^help$").describe("show this menu");
        assert_eq!(entry.description, "show this menu");
        assert!(format!("{:?}", entry).contains("^help$"));
    }

    #[test]
    fn test_reply_builders() {
        assert_eq!(Reply::empty().flow, Flow::Continue);
        assert_eq!(Reply::line("a").lines, vec!["a"]);
        assert_eq!(Reply::lines(["a", "b"]).lines.len(), 2);
        assert_eq!(Reply::line("bye").terminate().flow, Flow::Terminate);
    }

    #[tokio::test]
    async fn test_handler_fn_writes_reply() {
        let config = ServerConfig::builder(CommandTable::new()).build();
        let mock = Builder::new().write(b"> pong\r\n").build();
        let mut conn = Connection::new(mock, test_addr(), "> ");

        let handler = handler_fn(|_, msg| {
            assert_eq!(msg, "ping");
            Ok(Reply::line("pong"))
        });

        let flow = handler.handle(&config, &mut conn, "ping").await.unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[tokio::test]
    async fn test_handler_fn_error() {
        let config = ServerConfig::builder(CommandTable::new()).build();
        let mock = Builder::new().build();
        let mut conn = Connection::new(mock, test_addr(), "> ");

        let handler = handler_fn(|_, _| Err(HandlerError::Failed("boom".into())));

        let err = handler.handle(&config, &mut conn, "x").await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
