//! Connection Write Side
//!
//! A [`Connection`] is what command handlers see of a client: its address
//! and a way to write framed response lines back. The read side stays with
//! the reader task.

use crate::protocol::frame_lines;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// How long a single response write may take before it is abandoned.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(1);

/// The write side of one client connection.
pub struct Connection {
    /// Where responses go (the socket's write half in production)
    writer: Box<dyn AsyncWrite + Send + Unpin>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Prefix written in front of every line
    prefix: String,

    /// Bytes written so far
    bytes_written: u64,
}

impl Connection {
    /// Wraps a writer for the client at `addr`.
    pub fn new<W>(writer: W, addr: SocketAddr, prefix: impl Into<String>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Box::new(writer),
            addr,
            prefix: prefix.into(),
            bytes_written: 0,
        }
    }

    /// The client's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Total bytes written to this client.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Writes one framed line.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write_lines([line]).await
    }

    /// Writes several framed lines in a single write.
    pub async fn write_lines<I, S>(&mut self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bytes = frame_lines(&self.prefix, lines);
        let writer = &mut self.writer;

        let write = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };

        match tokio::time::timeout(WRITE_DEADLINE, write).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "write deadline exceeded",
                ))
            }
        }

        self.bytes_written += bytes.len() as u64;
        trace!(client = %self.addr, bytes = bytes.len(), "Sent response");
        Ok(())
    }

    /// Shuts down the write side, closing the client's stream.
    pub(crate) async fn shutdown(mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("prefix", &self.prefix)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}
