//! # LoRa Telemetry
//!
//! Receive sensor readings from a LoRa radio bridge, record each session to
//! CSV and show the live series.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, else `config/default.toml`,
//!      else built-in defaults)
//!    - Set up logging with tracing subscriber
//!    - Open the radio bridge serial port
//!
//! 2. **Main Loop**
//!    - Read `start`, `stop`, `clear`, `close` commands from stdin on a
//!      plain OS thread, so an idle terminal never holds up exit
//!    - Drain one sample to the display every drain period while running
//!    - Handle Ctrl+C as `close`
//!
//! 3. **Graceful Shutdown**
//!    - Stop the session and wait for the ingestion worker
//!    - Session files stay on disk
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```
//!
//! Expected output:
//! ```text
//! INFO lora_telemetry: LoRa Telemetry v0.1.0 starting...
//! INFO lora_telemetry::link::serial: Opened radio bridge at /dev/ttyACM0 (115200 baud)
//! INFO lora_telemetry: Commands: start, stop, clear, close
//! INFO lora_telemetry::session::recorder: Created new data file -> ./Temperature_19_10_2026_14-03-09.csv
//! INFO lora_telemetry::display: [1 pts] t=1.52s value=21.5
//! ```

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;
use std::thread;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use lora_telemetry::config::{Config, LoggingConfig};
use lora_telemetry::display::ConsoleDisplay;
use lora_telemetry::link::{self, SerialLink};
use lora_telemetry::session::{Command, SessionController};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name of the rolling log
const LOG_FILE_NAME: &str = "lora-telemetry.log";

/// Pending operator commands
const COMMAND_QUEUE_DEPTH: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("LoRa Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", source);

    let serial = SerialLink::open_with_paths(&config.link.ports[..], config.link.baud_rate)
        .context("Failed to open radio bridge")?;
    info!("Radio bridge opened at: {}", serial.device_path());

    let controller =
        SessionController::new(link::shared(serial), &config, ConsoleDisplay::new());

    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    if config.session.auto_start {
        tx.send(Command::Start).await?;
    }

    let stdin_tx = tx.clone();
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || forward_commands(std::io::stdin().lock(), stdin_tx))
        .context("Failed to spawn stdin reader")?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            let _ = tx.send(Command::Close).await;
        }
    });

    info!("Commands: start, stop, clear, close");
    controller.run(rx).await;

    Ok(())
}

/// Load the configuration and describe where it came from
fn load_config() -> Result<(Config, String)> {
    if let Some(path) = std::env::args().nth(1) {
        let config = Config::load(&path).with_context(|| format!("Failed to load {}", path))?;
        return Ok((config, path));
    }

    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        let config = Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_PATH))?;
        return Ok((config, DEFAULT_CONFIG_PATH.to_string()));
    }

    Ok((Config::default(), "built-in defaults".to_string()))
}

/// Initialize logging to stdout, or to a daily-rolling file when configured
///
/// The returned guard must be held until exit so buffered lines are written.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Forward operator commands read line by line from `input`
///
/// Blocks on `input`; run it on its own thread. Returns at end of input or
/// once the controller has gone away.
fn forward_commands<R: BufRead>(input: R, tx: mpsc::Sender<Command>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.blocking_send(command).is_err() {
                    return;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
    info!("stdin closed, commands now only via Ctrl+C");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file_is_valid() {
        let contents = include_str!("../config/default.toml");
        let config = Config::from_toml(contents).unwrap();
        let defaults = Config::default();

        assert_eq!(config.link.ports, defaults.link.ports);
        assert_eq!(config.link.receive_timeout_ms, defaults.link.receive_timeout_ms);
        assert_eq!(config.link.backoff_ms, defaults.link.backoff_ms);
        assert_eq!(config.session.drain_period_ms, defaults.session.drain_period_ms);
        assert_eq!(config.session.value_label, defaults.session.value_label);
    }

    #[test]
    fn test_forward_commands_parses_lines() {
        let input = std::io::Cursor::new("start\n\n  bogus\nSTOP\nquit\n");
        let (tx, mut rx) = mpsc::channel(8);

        forward_commands(input, tx);

        let mut received = Vec::new();
        while let Some(command) = rx.blocking_recv() {
            received.push(command);
        }
        assert_eq!(received, vec![Command::Start, Command::Stop, Command::Close]);
    }

    #[test]
    fn test_forward_commands_returns_when_controller_gone() {
        let input = std::io::Cursor::new("start\nstop\n");
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let reader = thread::spawn(move || forward_commands(input, tx));
        assert!(reader.join().is_ok());
    }

    #[test]
    fn test_runtime_exit_does_not_wait_for_stdin_thread() {
        // Stands in for a terminal nobody types into
        let (_keep_open, idle_input) = std::sync::mpsc::channel::<String>();
        let idle = IdleInput(idle_input);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let started = std::time::Instant::now();
        runtime.block_on(async {
            let (tx, mut rx) = mpsc::channel(8);
            thread::spawn(move || forward_commands(std::io::BufReader::new(idle), tx));
            let _ = tokio::time::timeout(std::time::Duration::from_millis(20), rx.recv()).await;
        });
        drop(runtime);

        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    /// Reader that blocks until its sender sends, like an idle stdin
    struct IdleInput(std::sync::mpsc::Receiver<String>);

    impl std::io::Read for IdleInput {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.recv() {
                Ok(text) => {
                    let n = text.len().min(buf.len());
                    buf[..n].copy_from_slice(&text.as_bytes()[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_CONFIG_PATH, "config/default.toml");
        assert_eq!(LOG_FILE_NAME, "lora-telemetry.log");
        assert_eq!(COMMAND_QUEUE_DEPTH, 16);
    }
}
