//! Connection Reader
//!
//! Owns the raw socket of one client and decides when the session ends.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Acceptor spawns the supervisor
//!        │
//!        ▼
//! 2. Reader splits the socket, spawns the Analyzer with the write half,
//!    and queues the synthetic "help" message
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────────┐
//!    │  wait for whichever comes first:             │
//!    │                                              │
//!    │  stop signal ─────────────> close (Stopped)  │
//!    │  idle timer ──────────────> close (Idle)     │
//!    │  read (5s deadline)                          │
//!    │    ├── line ──> reset idle timer, forward    │
//!    │    ├── EOF / 0x04 ──> forward "exit",        │
//!    │    │                  wait for stop (1s),    │
//!    │    │                  close (EndOfStream)    │
//!    │    └── deadline / transient error ──> loop   │
//!    └──────────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Drop the message sender, take the write half back from the Analyzer,
//!    shut the socket down
//!        │
//!        ▼
//! 5. Supervisor decrements the active counter (also after a panic)
//! ```
//!
//! The per-read deadline and the idle timeout are separate timers: the
//! first only bounds how long one read may block, the second bounds how
//! long a client may stay silent.

use crate::connection::analyzer::{Analyzer, EXIT_MESSAGE};
use crate::connection::Connection;
use crate::protocol::{decode_line, is_end_of_transmission};
use crate::server::{CloseReason, ServerConfig, ServerEvent};
use crate::stats::{CONNECTIONS_ACTIVE, PANICS_RECOVERED};
use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{timeout, Instant};
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Upper bound for one blocking read.
pub const READ_DEADLINE: Duration = Duration::from_secs(5);

/// How long to wait for the analyzer's stop signal after end of stream.
pub const EOF_GRACE: Duration = Duration::from_secs(1);

/// How long to wait for the analyzer to hand the connection back.
pub const ANALYZER_GRACE: Duration = Duration::from_secs(1);

/// Pause after a transient read error before reading again.
const READ_RETRY_DELAY: Duration = Duration::from_millis(150);

/// Stand-in deadline for idle timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Capacity of the reader -> analyzer message queue
const MESSAGE_QUEUE_DEPTH: usize = 32;

/// Sent to the analyzer first so the client sees the command menu.
pub const INITIAL_MESSAGE: &str = "help";

/// Spawns the supervised reader/analyzer pair for an accepted connection.
///
/// The acceptor has already counted the connection as active; the
/// supervisor takes it off again exactly once, whichever way the session
/// ends.
pub fn spawn_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
) -> JoinHandle<()> {
    let log = config.log.clone();
    tokio::spawn(supervise(stream, addr, config).with_subscriber(log))
}

/// Runs the reader as its own task so a panic anywhere in the session is
/// contained here.
async fn supervise(stream: TcpStream, addr: SocketAddr, config: Arc<ServerConfig>) {
    let span = info_span!("session", client = %addr, log = %config.log_name);
    let reader = Reader::new(stream, addr, Arc::clone(&config));
    let session = tokio::spawn(reader.run().instrument(span).with_current_subscriber());

    let reason = match session.await {
        Ok(reason) => reason,
        Err(e) => recover(&config, addr, e),
    };

    config.emit(ServerEvent::ConnectionClosed { addr, reason });
    config.stats.decrement(CONNECTIONS_ACTIVE);
}

/// Logs a failed task and counts it if it panicked.
fn recover(config: &ServerConfig, addr: SocketAddr, e: JoinError) -> CloseReason {
    if e.is_panic() {
        let panic = panic_message(e.into_panic().as_ref());
        error!(client = %addr, panic = %panic, "Panic while handling connection");
        config.stats.increment(PANICS_RECOVERED);
        CloseReason::Panicked
    } else {
        warn!(client = %addr, error = %e, "Connection task cancelled");
        CloseReason::Stopped
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Result of one read attempt, after the per-read deadline.
enum ReadOutcome {
    /// A line to forward
    Line(String),
    /// The client is done sending
    EndOfStream,
    /// Nothing arrived (deadline) or a transient error; read again
    Retry,
}

/// Owns raw I/O and the timeout/shutdown decision for one connection.
pub struct Reader {
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
}

impl Reader {
    pub fn new(stream: TcpStream, addr: SocketAddr, config: Arc<ServerConfig>) -> Self {
        Self {
            stream,
            addr,
            config,
        }
    }

    /// Runs the session to completion and reports why it ended.
    pub async fn run(self) -> CloseReason {
        let Reader {
            stream,
            addr,
            config,
        } = self;

        let (mut read_half, write_half) = stream.into_split();
        let conn = Connection::new(write_half, addr, config.prefix.clone());

        let (msg_tx, msg_rx) = mpsc::channel(MESSAGE_QUEUE_DEPTH);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let analyzer = Analyzer::new(Arc::clone(&config), conn, msg_rx, stop_tx);
        let mut analyzer = tokio::spawn(
            analyzer
                .run()
                .in_current_span()
                .with_current_subscriber(),
        );

        info!("Connection from {} established", addr);

        // Seeds both the menu and the repeat-last history
        let _ = msg_tx.send(INITIAL_MESSAGE.to_string()).await;

        let mut buf = vec![0u8; config.read_buffer_size.max(1)];
        let idle = tokio::time::sleep(config.idle_timeout);
        tokio::pin!(idle);

        let mut reason = loop {
            let read = tokio::select! {
                biased;
                _ = &mut stop_rx => break CloseReason::Stopped,
                _ = &mut idle => break CloseReason::IdleTimeout,
                read = timeout(READ_DEADLINE, read_half.read(&mut buf)) => read,
            };

            let outcome = match read {
                Ok(Ok(0)) => ReadOutcome::EndOfStream,
                Ok(Ok(n)) if is_end_of_transmission(&buf[..n]) => ReadOutcome::EndOfStream,
                Ok(Ok(n)) => ReadOutcome::Line(decode_line(&buf[..n])),
                Ok(Err(e)) if is_disconnect(&e) => {
                    debug!(error = %e, "Connection lost");
                    ReadOutcome::EndOfStream
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "Read error");
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                    ReadOutcome::Retry
                }
                Err(_) => {
                    trace!("Read deadline expired");
                    ReadOutcome::Retry
                }
            };

            match outcome {
                ReadOutcome::Line(line) => {
                    idle.as_mut().reset(idle_deadline(Instant::now(), config.idle_timeout));
                    if msg_tx.send(line).await.is_err() {
                        // Analyzer ended without signalling (it panicked)
                        break CloseReason::Stopped;
                    }
                }
                ReadOutcome::EndOfStream => {
                    debug!("End of stream");
                    let _ = msg_tx.send(EXIT_MESSAGE.to_string()).await;
                    let _ = timeout(EOF_GRACE, &mut stop_rx).await;
                    break CloseReason::EndOfStream;
                }
                ReadOutcome::Retry => {}
            }
        };

        // Ends the analyzer's receive loop if it is still waiting
        drop(msg_tx);

        let mut bytes_sent = 0;
        let conn = match timeout(ANALYZER_GRACE, &mut analyzer).await {
            Ok(Ok(conn)) => Some(conn),
            Ok(Err(e)) => {
                reason = recover(&config, addr, e);
                None
            }
            Err(_) => {
                warn!("Analyzer did not finish in time, aborting it");
                analyzer.abort();
                None
            }
        };

        if let Some(conn) = conn {
            bytes_sent = conn.bytes_written();
            if let Err(e) = conn.shutdown().await {
                debug!(error = %e, "Error shutting down connection");
            }
        }
        drop(read_half);

        match reason {
            CloseReason::IdleTimeout => info!(
                bytes_sent,
                "Connection from {} closed. Timeout {:?} exceeded",
                addr, config.idle_timeout
            ),
            _ => info!(bytes_sent, "Connection from {} closed ({})", addr, reason),
        }

        reason
    }
}

/// When the idle timer fires if the client stays silent from `now` on.
///
/// A timeout that does not fit on the clock never fires in practice.
fn idle_deadline(now: Instant, idle_timeout: Duration) -> Instant {
    now.checked_add(idle_timeout).unwrap_or(now + FAR_FUTURE)
}

/// Errors that mean the peer is gone for good.
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
