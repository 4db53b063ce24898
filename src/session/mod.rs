//! # Session Module
//!
//! One start-to-stop recording run and the machinery around it.
//!
//! This module handles:
//! - Session identity (start time, output file, running flag)
//! - Appending samples to the session CSV file
//! - The radio ingestion worker and the display drain tick
//! - The controller that starts, stops and clears sessions

pub mod controller;
pub mod drain;
pub mod handoff;
pub mod ingest;
pub mod recorder;

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::telemetry::Sample;

pub use controller::{Command, SessionController, SessionState};

/// One recording run
///
/// Cloning is cheap; clones share the running flag, so the controller can
/// stop a session whose worker holds another clone.
#[derive(Debug, Clone)]
pub struct Session {
    started: Instant,
    started_wall: DateTime<Local>,
    output_path: PathBuf,
    running: Arc<AtomicBool>,
}

impl Session {
    /// Begin a running session writing to `output_path`
    pub fn begin(output_path: PathBuf, started_wall: DateTime<Local>) -> Self {
        Self {
            started: Instant::now(),
            started_wall,
            output_path,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stamp a freshly decoded value with the time since session start
    pub fn stamp(&self, value: f64) -> Sample {
        Sample::new(self.started.elapsed(), value)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the ingestion worker to stop after its current receive
    pub fn halt(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn started_wall(&self) -> DateTime<Local> {
        self.started_wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_new_session_is_running() {
        let session = Session::begin(PathBuf::from("x.csv"), Local::now());
        assert!(session.is_running());
        assert_eq!(session.output_path(), Path::new("x.csv"));
    }

    #[test]
    fn test_started_wall_is_kept() {
        let wall = Local::now();
        let session = Session::begin(PathBuf::from("x.csv"), wall);
        assert_eq!(session.started_wall(), wall);
        assert_eq!(session.clone().started_wall(), wall);
    }

    #[test]
    fn test_halt_is_shared_between_clones() {
        let session = Session::begin(PathBuf::from("x.csv"), Local::now());
        let worker_view = session.clone();

        session.halt();
        assert!(!worker_view.is_running());
    }

    #[test]
    fn test_stamp_is_relative_to_start() {
        let session = Session::begin(PathBuf::from("x.csv"), Local::now());
        thread::sleep(Duration::from_millis(50));

        let sample = session.stamp(20.0);
        assert!(sample.elapsed_seconds() >= 0.05, "got {}", sample.elapsed_seconds());
        assert!(sample.elapsed_seconds() < 1.0, "got {}", sample.elapsed_seconds());
        assert_eq!(sample.value(), 20.0);
    }
}
