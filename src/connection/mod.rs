//! Connection Module
//!
//! Each accepted client is served by two tasks linked by a message channel
//! and a stop signal, both private to that connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Acceptor                                │
//! │                    (server::listener)                       │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ spawn_connection()
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Supervisor (catches panics, owns the active counter)       │
//! │                                                             │
//! │  ┌─────────────┐   messages (mpsc)   ┌─────────────┐        │
//! │  │   Reader    │ ──────────────────> │  Analyzer   │        │
//! │  │ (read half) │ <────────────────── │ (write half)│        │
//! │  └─────────────┘   stop (oneshot)    └──────┬──────┘        │
//! │                                             │               │
//! │                                             ▼               │
//! │                                      Command table          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is shared between connections except the statistics store and
//! the log sink.

pub mod analyzer;
pub mod reader;
pub mod writer;

// Re-export commonly used types
pub use analyzer::{bad_command_notice, Analyzer, EXIT_MESSAGE};
pub use reader::{spawn_connection, Reader, INITIAL_MESSAGE, READ_DEADLINE};
pub use writer::Connection;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{default_table, handler_fn, CommandEntry, CommandTable, HandlerError, Reply};
    use crate::protocol::{CURSOR_UP, END_OF_TRANSMISSION};
    use crate::server::{serve, CloseReason, ServerConfig, ServerEvent};
    use crate::stats::{Counters, CONNECTIONS_ACCEPTED, CONNECTIONS_ACTIVE, PANICS_RECOVERED};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    async fn create_test_server(
        commands: CommandTable,
        idle_timeout: Duration,
    ) -> (SocketAddr, Arc<Counters>, mpsc::Receiver<ServerEvent>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(Counters::new());
        let (events_tx, events_rx) = mpsc::channel(64);

        let config = ServerConfig::builder(commands)
            .idle_timeout(idle_timeout)
            .stats(stats.clone())
            .events(events_tx)
            .build();

        tokio::spawn(serve(listener, Arc::new(config)));

        (addr, stats, events_rx)
    }

    async fn default_server() -> (SocketAddr, Arc<Counters>, mpsc::Receiver<ServerEvent>) {
        create_test_server(default_table().unwrap(), Duration::from_secs(30)).await
    }

    /// Reads until `needle` shows up in everything received so far.
    async fn read_until(client: &mut TcpStream, needle: &str) -> String {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);

        while !String::from_utf8_lossy(&received).contains(needle) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, client.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => received.extend_from_slice(&buf[..n]),
                other => panic!(
                    "did not receive {:?}, got {:?} ({:?})",
                    needle,
                    String::from_utf8_lossy(&received),
                    other.map(|r| r.map_err(|e| e.kind()))
                ),
            }
        }

        String::from_utf8_lossy(&received).into_owned()
    }

    /// Waits for the server to close the connection, draining any output.
    async fn expect_closed(client: &mut TcpStream, within: Duration) {
        let mut buf = [0u8; 1024];
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, client.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return,
                Ok(Ok(_)) => continue,
                Err(_) => panic!("connection still open after {:?}", within),
            }
        }
    }

    async fn wait_for_counter(stats: &Counters, name: &str, value: i64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while stats.get(name) != value {
            assert!(
                tokio::time::Instant::now() < deadline,
                "{} stuck at {}, expected {}",
                name,
                stats.get(name),
                value
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_help_on_connect_then_exit() {
        let (addr, stats, _events) = default_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let menu = read_until(&mut client, "exit").await;
        assert!(menu.starts_with("[Telnet]: "));
        assert!(menu.contains("help"));
        assert!(menu.ends_with("\r\n"));

        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 1).await;

        client.write_all(b"exit\r\n").await.unwrap();
        expect_closed(&mut client, Duration::from_secs(2)).await;

        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 0).await;
        assert_eq!(stats.get(CONNECTIONS_ACCEPTED), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection_open() {
        let (addr, stats, _events) = default_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;

        client.write_all(b"zzz\r\n").await.unwrap();
        let reply = read_until(&mut client, "zzz").await;
        assert!(reply.contains("Bad command send!"));
        assert_eq!(reply.matches("Bad command send!").count(), 1);

        // Still served
        client.write_all(b"echo still here\r\n").await.unwrap();
        read_until(&mut client, "still here").await;
        assert_eq!(stats.get(CONNECTIONS_ACTIVE), 1);
    }

    #[tokio::test]
    async fn test_quit_aliases_close_connection() {
        let (addr, stats, _events) = default_server().await;

        for quit in [&b"q\r\n"[..], &b"Q\r\n"[..]] {
            let mut client = TcpStream::connect(addr).await.unwrap();
            read_until(&mut client, "exit").await;

            client.write_all(quit).await.unwrap();
            expect_closed(&mut client, Duration::from_secs(2)).await;
        }

        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 0).await;
    }

    #[tokio::test]
    async fn test_cursor_up_first_repeats_help() {
        let (addr, _stats, _events) = default_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;

        client
            .write_all(format!("{}\r\n", CURSOR_UP).as_bytes())
            .await
            .unwrap();
        let repeated = read_until(&mut client, "exit").await;
        assert!(repeated.contains("Available commands"));
        assert!(!repeated.contains("Bad command"));
    }

    #[tokio::test]
    async fn test_end_of_transmission_closes() {
        let (addr, stats, _events) = default_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;

        client.write_all(&[END_OF_TRANSMISSION]).await.unwrap();
        expect_closed(&mut client, Duration::from_secs(3)).await;
        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 0).await;
    }

    #[tokio::test]
    async fn test_client_hangup_closes() {
        let (addr, stats, mut events) = default_server().await;

        let client = TcpStream::connect(addr).await.unwrap();
        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 1).await;
        drop(client);

        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 0).await;

        let mut closed = None;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(3), events.recv()).await
        {
            if let ServerEvent::ConnectionClosed { reason, .. } = event {
                closed = Some(reason);
                break;
            }
        }
        // Exit is dispatched on EOF, so either path may win the race.
        assert!(matches!(
            closed,
            Some(CloseReason::EndOfStream) | Some(CloseReason::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_idle_timeout_closes() {
        let (addr, stats, mut events) =
            create_test_server(default_table().unwrap(), Duration::from_millis(300)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;

        expect_closed(&mut client, Duration::from_secs(3)).await;
        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 0).await;

        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ServerEvent::ConnectionClosed { reason, .. } = event {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons, vec![CloseReason::IdleTimeout]);
    }

    #[tokio::test]
    async fn test_activity_resets_idle_timeout() {
        let (addr, _stats, _events) =
            create_test_server(default_table().unwrap(), Duration::from_millis(400)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;

        for i in 0..4 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            client
                .write_all(format!("echo ping {}\r\n", i).as_bytes())
                .await
                .unwrap();
            read_until(&mut client, &format!("ping {}", i)).await;
        }
    }

    #[tokio::test]
    async fn test_unbounded_idle_timeout_keeps_serving() {
        let (addr, stats, _events) =
            create_test_server(default_table().unwrap(), Duration::from_secs(u64::MAX)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;

        client.write_all(b"echo hi\r\n").await.unwrap();
        read_until(&mut client, "]: hi\r\n").await;

        client.write_all(b"echo again\r\n").await.unwrap();
        read_until(&mut client, "]: again\r\n").await;

        assert_eq!(stats.get(PANICS_RECOVERED), 0);
        assert_eq!(stats.get(CONNECTIONS_ACTIVE), 1);

        client.write_all(b"exit\r\n").await.unwrap();
        expect_closed(&mut client, Duration::from_secs(3)).await;
    }

    #[tokio::test]
    async fn test_handler_error_closes_connection() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);

        let table = default_table().unwrap().with(
            CommandEntry::new(
                "fail",
                r"^fail$",
                handler_fn(move |_, _| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(HandlerError::Failed("deliberate".into()))
                }),
            )
            .unwrap(),
        );
        let (addr, stats, _events) = create_test_server(table, Duration::from_secs(30)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;

        client.write_all(b"fail\r\n").await.unwrap();
        expect_closed(&mut client, Duration::from_secs(3)).await;

        // Anything sent afterwards goes nowhere.
        let _ = client.write_all(b"fail\r\n").await;
        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 0).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_match_wins_end_to_end() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let (f, s) = (Arc::clone(&first), Arc::clone(&second));

        let table = CommandTable::new()
            .with(
                CommandEntry::new("help", r"^help$", handler_fn(|_, _| Ok(Reply::line("menu"))))
                    .unwrap(),
            )
            .with(
                CommandEntry::new(
                    "first",
                    r"^go",
                    handler_fn(move |_, _| {
                        f.fetch_add(1, Ordering::SeqCst);
                        Ok(Reply::line("first ran"))
                    }),
                )
                .unwrap(),
            )
            .with(
                CommandEntry::new(
                    "second",
                    r"^go now$",
                    handler_fn(move |_, _| {
                        s.fetch_add(1, Ordering::SeqCst);
                        Ok(Reply::line("second ran"))
                    }),
                )
                .unwrap(),
            );
        let (addr, _stats, _events) = create_test_server(table, Duration::from_secs(30)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "menu").await;

        client.write_all(b"go now\r\n").await.unwrap();
        let reply = read_until(&mut client, "first ran").await;
        assert!(!reply.contains("second ran"));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let table = default_table().unwrap().with(
            CommandEntry::new(
                "explode",
                r"^explode$",
                handler_fn(|_, _| -> Result<Reply, HandlerError> { panic!("handler exploded") }),
            )
            .unwrap(),
        );
        let (addr, stats, _events) = create_test_server(table, Duration::from_secs(30)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "exit").await;
        client.write_all(b"explode\r\n").await.unwrap();
        expect_closed(&mut client, Duration::from_secs(3)).await;

        wait_for_counter(&stats, PANICS_RECOVERED, 1).await;
        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 0).await;

        // The acceptor is unaffected
        let mut other = TcpStream::connect(addr).await.unwrap();
        read_until(&mut other, "exit").await;
        assert_eq!(stats.get(CONNECTIONS_ACCEPTED), 2);
    }

    #[tokio::test]
    async fn test_connections_are_isolated() {
        let (addr, stats, _events) = default_server().await;

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();
        read_until(&mut a, "exit").await;
        read_until(&mut b, "exit").await;
        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 2).await;

        a.write_all(b"echo from-a\r\n").await.unwrap();
        b.write_all(b"echo from-b\r\n").await.unwrap();
        let reply_a = read_until(&mut a, "from-a").await;
        let reply_b = read_until(&mut b, "from-b").await;
        assert!(!reply_a.contains("from-b"));
        assert!(!reply_b.contains("from-a"));

        // Stopping one session leaves the other alone
        a.write_all(b"exit\r\n").await.unwrap();
        expect_closed(&mut a, Duration::from_secs(2)).await;
        wait_for_counter(&stats, CONNECTIONS_ACTIVE, 1).await;

        b.write_all(b"echo still-b\r\n").await.unwrap();
        read_until(&mut b, "still-b").await;
        assert_eq!(stats.get(CONNECTIONS_ACCEPTED), 2);
    }
}
