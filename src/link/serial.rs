//! # Serial LoRa Link
//!
//! Receives LoRa packets through a radio bridge on a USB serial port.
//!
//! The bridge (a microcontroller driving the LoRa transceiver) forwards every
//! received packet as one newline-terminated line, and transmits every line
//! written to it. This module handles:
//! - Auto-detecting the bridge by trying known device paths
//! - Reading with a deadline, reassembling lines split across reads
//! - Writing payloads for broadcast

use bytes::{Bytes, BytesMut};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tokio_serial::SerialPort;
use tracing::{debug, info, warn};

use super::LinkAdapter;
use crate::error::{Result, TelemetryError};

/// Default radio bridge device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices (most common for microcontroller bridges)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Default bridge baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Bytes read from the port per call
const READ_CHUNK_SIZE: usize = 64;

/// Longest line kept while waiting for its terminator
///
/// LoRa payloads are at most 252 bytes; anything longer is line noise.
const MAX_LINE_LEN: usize = 256;

/// Serial radio bridge handle
pub struct SerialLink {
    /// Serial port handle
    port: Box<dyn SerialPort>,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
    /// Bytes received but not yet returned as a line
    pending: BytesMut,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device_path", &self.device_path)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    /// Open the radio bridge, trying each path in order
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyACM0"])
    /// * `baud_rate` - Bridge baud rate
    ///
    /// # Errors
    ///
    /// Returns `LinkNotFound` if none of the paths could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_telemetry::link::SerialLink;
    /// use lora_telemetry::link::serial::{DEFAULT_BAUD_RATE, DEFAULT_DEVICE_PATHS};
    ///
    /// let link = SerialLink::open_with_paths(DEFAULT_DEVICE_PATHS, DEFAULT_BAUD_RATE)?;
    /// println!("Radio bridge at: {}", link.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_with_paths<S: AsRef<str>>(paths: &[S], baud_rate: u32) -> Result<Self> {
        for path in paths {
            let path = path.as_ref();
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened radio bridge at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                        pending: BytesMut::with_capacity(MAX_LINE_LEN),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        let tried: Vec<&str> = paths.iter().map(|p| p.as_ref()).collect();
        Err(TelemetryError::LinkNotFound(tried.join(", ")))
    }

    /// Open a specific serial port with 8N1 settings
    fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open()
            .map_err(|e| TelemetryError::Link(format!("Failed to open {}: {}", path, e)))
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl LinkAdapter for SerialLink {
    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(line) = take_line(&mut self.pending) {
                return Ok(Some(line));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            self.port
                .set_timeout(remaining)
                .map_err(|e| TelemetryError::Link(format!("Failed to set timeout: {}", e)))?;

            match self.port.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if self.pending.len() > MAX_LINE_LEN && !self.pending.contains(&b'\n') {
                        warn!(
                            "Discarding {} bytes without line terminator",
                            self.pending.len()
                        );
                        self.pending.clear();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => {
                    return Err(TelemetryError::Link(format!("Failed to read: {}", e)));
                }
            }
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.port
            .write_all(payload)
            .and_then(|_| self.port.write_all(b"\n"))
            .map_err(|e| TelemetryError::Link(format!("Failed to write payload: {}", e)))?;

        self.port
            .flush()
            .map_err(|e| TelemetryError::Link(format!("Failed to flush serial port: {}", e)))?;

        debug!("Sent payload ({} bytes)", payload.len());
        Ok(())
    }
}

/// Split the first complete line off `pending`
///
/// The terminator (`\n` or `\r\n`) is stripped. Blank lines are skipped.
fn take_line(pending: &mut BytesMut) -> Option<Bytes> {
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let mut line = pending.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }
        if !line.is_empty() {
            return Some(line.freeze());
        }
    }
    None
}
