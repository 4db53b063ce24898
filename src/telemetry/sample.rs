//! # Sample Type
//!
//! One decoded telemetry reading, stamped relative to its session start.

use std::time::Duration;

/// Timestamps are kept at centisecond resolution
const ELAPSED_RESOLUTION: f64 = 100.0;

/// A single telemetry reading
///
/// Immutable once created. `elapsed_seconds` is measured from the start of
/// the session that produced it and rounded to 0.01 s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    elapsed_seconds: f64,
    value: f64,
}

impl Sample {
    /// Create a sample from the time elapsed since session start
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use lora_telemetry::telemetry::Sample;
    ///
    /// let sample = Sample::new(Duration::from_millis(1234), 21.5);
    /// assert_eq!(sample.elapsed_seconds(), 1.23);
    /// assert_eq!(sample.value(), 21.5);
    /// ```
    pub fn new(elapsed: Duration, value: f64) -> Self {
        let elapsed_seconds =
            (elapsed.as_secs_f64() * ELAPSED_RESOLUTION).round() / ELAPSED_RESOLUTION;
        Self {
            elapsed_seconds,
            value,
        }
    }

    /// Seconds since the session started
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// The decoded reading
    pub fn value(&self) -> f64 {
        self.value
    }
}
