//! # Display Module
//!
//! The live view fed by the session controller.
//!
//! The pipeline does not own a window. Anything that can show an ordered
//! series of samples implements [`DisplaySink`]; the binary uses
//! [`ConsoleDisplay`], which reports through the log.

use std::path::Path;
use tracing::{debug, error, info};

use crate::error::TelemetryError;
use crate::telemetry::Sample;

/// Receiver of everything the operator should see
#[cfg_attr(test, mockall::automock)]
pub trait DisplaySink {
    /// Redraw with the full accumulated series, oldest first
    fn render(&mut self, series: &[Sample]);

    /// Update the current-reading readout
    fn show_latest(&mut self, value: f64);

    /// A session began writing to `output_path`
    fn session_started(&mut self, output_path: &Path);

    /// The running session ended
    fn session_stopped(&mut self);

    /// A failure the operator needs to know about
    fn report_error(&mut self, error: &TelemetryError);
}

/// Format a reading for the current-value readout (one decimal)
pub fn format_reading(value: f64) -> String {
    format!("{:.1}", value)
}

/// Log-backed display for headless runs
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    points: usize,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for ConsoleDisplay {
    fn render(&mut self, series: &[Sample]) {
        match series.last() {
            Some(last) if series.len() != self.points => {
                info!(
                    "[{} pts] t={:.2}s value={}",
                    series.len(),
                    last.elapsed_seconds(),
                    last.value()
                );
            }
            None if self.points != 0 => info!("Plot cleared"),
            _ => {}
        }
        self.points = series.len();
    }

    fn show_latest(&mut self, value: f64) {
        debug!("Current reading: {}", format_reading(value));
    }

    fn session_started(&mut self, output_path: &Path) {
        info!("Data file: {}", output_path.display());
    }

    fn session_stopped(&mut self) {
        info!("Data collection stopped.");
    }

    fn report_error(&mut self, error: &TelemetryError) {
        error!("{}", error);
    }
}
