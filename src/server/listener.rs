//! Connection Acceptor
//!
//! Owns the listening socket. Every accepted connection is handed to its
//! own supervised reader/analyzer pair immediately, so a slow or broken
//! client never holds up the accept loop.

use crate::connection::spawn_connection;
use crate::server::config::ServerConfig;
use crate::server::events::ServerEvent;
use crate::stats::{CONNECTIONS_ACCEPTED, CONNECTIONS_ACTIVE};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

/// Pause after a failed accept, so a persistent failure (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Binds the configured address and serves connections forever.
///
/// Only returns on a bind failure; the accept loop itself has no exit.
pub async fn run(config: Arc<ServerConfig>) -> Result<(), ServerError> {
    let log = config.log.clone();
    async move {
        let listener = bind(&config).await?;
        accept_loop(listener, config).await;
        Ok::<(), ServerError>(())
    }
    .with_subscriber(log)
    .await
}

/// Binds the listening socket for `config`.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let addr = config.bind_address();

    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!("Listening on {}", addr);
            Ok(listener)
        }
        Err(source) => {
            error!(error = %source, "Failed to bind {}", addr);
            Err(ServerError::Bind { addr, source })
        }
    }
}

/// Accepts connections on an already bound listener, forever.
pub async fn serve(listener: TcpListener, config: Arc<ServerConfig>) {
    let log = config.log.clone();
    accept_loop(listener, config).with_subscriber(log).await
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, config: Arc<ServerConfig>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                config.stats.increment(CONNECTIONS_ACCEPTED);
                config.stats.increment(CONNECTIONS_ACTIVE);
                config.emit(ServerEvent::ConnectionEstablished { addr });

                // Hand off and go straight back to accepting
                spawn_connection(stream, addr, Arc::clone(&config));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandTable;

    #[tokio::test]
    async fn test_bind_failure_returns_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = Arc::new(ServerConfig::builder(CommandTable::new()).port(port).build());
        let err = run(config).await.unwrap_err();

        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
