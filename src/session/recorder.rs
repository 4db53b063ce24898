//! # Session Recorder
//!
//! Append-only CSV log of the samples accepted during one session.
//!
//! File layout (default settings):
//!
//! ```text
//! Time (s);Temperature (°C)
//! 1.52;21.5
//! 3.04;21.75
//! ```
//!
//! Every record is flushed as soon as it is written, so a crash can lose at
//! most the record being written. Whole numbers keep their `.0` (`2.0;20.0`).

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{Result, TelemetryError};
use crate::telemetry::Sample;

/// Header of the time column
pub const TIME_COLUMN: &str = "Time (s)";

/// Timestamp layout used in session file names
pub const FILE_STAMP_FORMAT: &str = "%d_%m_%Y_%H-%M-%S";

/// Suffixed names tried when the plain name is taken
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// How session files are named and laid out
#[derive(Debug, Clone)]
pub struct RecordFormat {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub value_label: String,
    pub delimiter: u8,
}

impl From<&SessionConfig> for RecordFormat {
    fn from(config: &SessionConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.output_dir),
            file_prefix: config.file_prefix.clone(),
            value_label: config.value_label.clone(),
            delimiter: config.delimiter_byte(),
        }
    }
}

impl RecordFormat {
    /// File name for a session started at `at`, e.g.
    /// `Temperature_19_10_2026_14-03-09.csv`
    ///
    /// `attempt` 0 gives the plain name; later attempts append `_<n>`.
    pub fn file_name(&self, at: &DateTime<Local>, attempt: u32) -> String {
        let stamp = at.format(FILE_STAMP_FORMAT);
        if attempt == 0 {
            format!("{}_{}.csv", self.file_prefix, stamp)
        } else {
            format!("{}_{}_{}.csv", self.file_prefix, stamp, attempt)
        }
    }
}

/// Text written for a time or reading
///
/// Shortest round-trip form, with `.0` kept on whole numbers.
pub fn decimal_text(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

/// Writer for one session file
pub struct CsvRecorder {
    writer: csv::Writer<Box<dyn Write + Send>>,
    path: PathBuf,
    records: u64,
}

impl std::fmt::Debug for CsvRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRecorder")
            .field("path", &self.path)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl CsvRecorder {
    /// Create a new session file and write its header
    ///
    /// Never overwrites an existing file: if the name for `at` is taken
    /// (two sessions started within the same second), a numeric suffix is
    /// added.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the directory or file cannot be created or
    /// the header cannot be written
    pub fn create(format: &RecordFormat, at: &DateTime<Local>) -> Result<Self> {
        std::fs::create_dir_all(&format.output_dir).map_err(|e| {
            persistence(format!("Failed to create {}: {}", format.output_dir.display(), e))
        })?;

        let (file, path) = open_unique(format, at)?;

        let mut writer = csv_writer(Box::new(file), format.delimiter);

        writer.write_record([TIME_COLUMN, format.value_label.as_str()])?;
        writer.flush().map_err(|e| {
            persistence(format!("Failed to write header to {}: {}", path.display(), e))
        })?;

        info!("Created new data file -> {}", path.display());

        Ok(Self {
            writer,
            path,
            records: 0,
        })
    }

    /// Append one sample and flush it to disk
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the write or flush fails
    pub fn append(&mut self, sample: &Sample) -> Result<()> {
        self.writer.write_record([
            decimal_text(sample.elapsed_seconds()),
            decimal_text(sample.value()),
        ])?;
        self.writer.flush().map_err(|e| {
            persistence(format!("Failed to flush {}: {}", self.path.display(), e))
        })?;

        self.records += 1;
        debug!(
            "Recorded t={}s value={} ({} records)",
            sample.elapsed_seconds(),
            sample.value(),
            self.records
        );
        Ok(())
    }

    /// Recorder over an arbitrary sink, without a header
    #[cfg(test)]
    pub(crate) fn with_writer(sink: Box<dyn Write + Send>, path: PathBuf, delimiter: u8) -> Self {
        Self {
            writer: csv_writer(sink, delimiter),
            path,
            records: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written after the header
    pub fn records(&self) -> u64 {
        self.records
    }
}

fn csv_writer(sink: Box<dyn Write + Send>, delimiter: u8) -> csv::Writer<Box<dyn Write + Send>> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(sink)
}

fn open_unique(format: &RecordFormat, at: &DateTime<Local>) -> Result<(File, PathBuf)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = format.output_dir.join(format.file_name(at, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{} already exists, trying next name", path.display());
                continue;
            }
            Err(e) => {
                return Err(persistence(format!(
                    "Failed to create {}: {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    Err(persistence(format!(
        "No free file name for {} in {}",
        format.file_name(at, 0),
        format.output_dir.display()
    )))
}

fn persistence(msg: String) -> TelemetryError {
    TelemetryError::Persistence(msg)
}
