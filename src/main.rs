//! telnetctl - A Line-Oriented Telnet Command Console
//!
//! This is the main entry point for the console server.
//! It loads settings, sets up logging, and serves the built-in command
//! table until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use telnetctl::commands::default_table;
use telnetctl::server::{run, ConfigError, ServerConfig, ServerEvent, Settings};
use telnetctl::stats::Counters;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Capacity of the lifecycle event queue
const EVENT_QUEUE_DEPTH: usize = 64;

/// Command-line arguments. Anything given here overrides the settings file.
#[derive(Parser, Debug)]
#[command(name = "telnetctl", version, about = "A line-oriented telnet command console")]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host to bind to (default: 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (default: 2323)
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds of silence before a session is closed (default: 300)
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Read buffer size in bytes (default: 1024)
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Log name; logs are written to <LOG_NAME>.log (default: telnet)
    #[arg(long)]
    log_name: Option<String>,

    /// Log to stdout instead of the log file
    #[arg(long)]
    stdout: bool,
}

impl Cli {
    /// Merges defaults, the settings file, and command-line overrides.
    fn settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(secs) = self.idle_timeout {
            settings.idle_timeout_secs = secs;
        }
        if let Some(size) = self.buffer_size {
            settings.read_buffer_size = size;
        }
        if let Some(name) = &self.log_name {
            settings.log_name = name.clone();
        }

        Ok(settings)
    }
}

/// Installs the global subscriber, writing to `<log_name>.log` unless
/// `stdout` is set.
fn init_logging(settings: &Settings, stdout: bool) -> anyhow::Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if stdout {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .init();
        return Ok(());
    }

    let path = format!("{}.log", settings.log_name);
    let file = File::create(&path).with_context(|| format!("Create log file {}", path))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn print_banner(settings: &Settings, log_target: &str) {
    println!(
        r#"
telnetctl v{} - Telnet Command Console
──────────────────────────────────────────────────────────────
Listening on {}:{} (idle timeout {}s)
Logging to {}

Connect with: telnet {} {}
Use Ctrl+C to shutdown.
"#,
        telnetctl::VERSION,
        settings.host,
        settings.port,
        settings.idle_timeout_secs,
        log_target,
        settings.host,
        settings.port,
    );
}

/// Logs every lifecycle event the server reports.
async fn log_events(mut events: mpsc::Receiver<ServerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::ConnectionEstablished { addr } => info!(client = %addr, "Session opened"),
            ServerEvent::ConnectionClosed { addr, reason } => {
                info!(client = %addr, reason = %reason, "Session closed")
            }
            ServerEvent::Command(command) => {
                info!(name = %command.name, args = ?command.args, "Control command received")
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    init_logging(&settings, cli.stdout)?;
    let log_target = if cli.stdout {
        "stdout".to_string()
    } else {
        format!("{}.log", settings.log_name)
    };
    print_banner(&settings, &log_target);

    let stats = Arc::new(Counters::new());
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    tokio::spawn(log_events(events_rx));

    let config = ServerConfig::builder(default_table()?)
        .settings(&settings)
        .stats(stats)
        .events(events_tx)
        .build();
    info!(commands = config.commands.len(), "Command table loaded");

    // Set up graceful shutdown
    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        result = run(Arc::new(config)) => result?,
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}
