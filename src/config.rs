//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional; missing values fall back to
//! the defaults below.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};

/// Baud rates the radio bridge firmware supports
const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Radio link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_ports")]
    pub ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

/// Session recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_value_label")]
    pub value_label: String,

    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    #[serde(default = "default_drain_period_ms")]
    pub drain_period_ms: u64,

    #[serde(default)]
    pub auto_start: bool,
}

/// Payload decoder configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DecoderConfig {
    /// Field to extract from `name = value unit` payloads
    #[serde(default)]
    pub field: Option<String>,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Write logs to a daily-rolling file in this directory instead of stdout
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_ports() -> Vec<String> {
    vec!["/dev/ttyACM0".to_string(), "/dev/ttyUSB0".to_string()]
}
fn default_baud_rate() -> u32 { 115200 }
fn default_receive_timeout_ms() -> u64 { 5000 }
fn default_backoff_ms() -> u64 { 500 }

fn default_output_dir() -> String { ".".to_string() }
fn default_file_prefix() -> String { "Temperature".to_string() }
fn default_value_label() -> String { "Temperature (°C)".to_string() }
fn default_delimiter() -> String { ";".to_string() }
fn default_drain_period_ms() -> u64 { 100 }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            baud_rate: default_baud_rate(),
            receive_timeout_ms: default_receive_timeout_ms(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            value_label: default_value_label(),
            delimiter: default_delimiter(),
            drain_period_ms: default_drain_period_ms(),
            auto_start: false,
        }
    }
}

impl LinkConfig {
    /// How long one `receive` call may block
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Pause after every receive attempt
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl SessionConfig {
    /// Period of the display drain tick
    pub fn drain_period(&self) -> Duration {
        Duration::from_millis(self.drain_period_ms)
    }

    /// Field delimiter as a byte
    ///
    /// Only meaningful after validation, which guarantees a single ASCII char.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter.as_bytes().first().copied().unwrap_or(b';')
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.link.ports.is_empty() || self.link.ports.iter().any(|p| p.is_empty()) {
            return Err(invalid("link ports cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.link.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.link.receive_timeout_ms == 0 || self.link.receive_timeout_ms > 60000 {
            return Err(invalid("receive_timeout_ms must be between 1 and 60000"));
        }

        if self.link.backoff_ms == 0 || self.link.backoff_ms > 60000 {
            return Err(invalid("backoff_ms must be between 1 and 60000"));
        }

        if self.session.output_dir.is_empty() {
            return Err(invalid("session output_dir cannot be empty"));
        }

        if self.session.file_prefix.is_empty()
            || self.session.file_prefix.contains(&['/', '\\'][..])
        {
            return Err(invalid(
                "file_prefix must be non-empty and must not contain path separators",
            ));
        }

        if self.session.value_label.is_empty() {
            return Err(invalid("value_label cannot be empty"));
        }

        let delimiter = self.session.delimiter.as_bytes();
        if delimiter.len() != 1 || !delimiter[0].is_ascii() || delimiter[0] == b'\n' {
            return Err(invalid("delimiter must be a single ASCII character"));
        }

        if self.session.drain_period_ms == 0 || self.session.drain_period_ms > 10000 {
            return Err(invalid("drain_period_ms must be between 1 and 10000"));
        }

        if let Some(field) = &self.decoder.field {
            if field.trim().is_empty() || field.contains(&['=', '\t'][..]) {
                return Err(invalid("decoder field must be a non-empty field name"));
            }
        }

        if let Some(dir) = &self.logging.directory {
            if dir.is_empty() {
                return Err(invalid("logging directory cannot be empty when set"));
            }
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}
