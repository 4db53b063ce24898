//! # Session Controller
//!
//! Owns the session lifecycle and everything the display sees.
//!
//! ## States
//!
//! - `Idle`: no session; the drain tick is inactive
//! - `Running`: one ingestion worker is receiving; the drain tick moves one
//!   sample per period into the plotted series
//!
//! `start` works from either state (a running session is stopped first),
//! `stop` returns to `Idle`, `clear` empties the plotted series in any state
//! without touching the session file or the handoff channel.
//!
//! If the worker dies (the session file became unwritable, or the handoff
//! broke) the next tick notices, shows every sample that made it into the
//! file, reports the error and returns to `Idle`.

use chrono::{DateTime, Local};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::drain::DrainLoop;
use super::handoff;
use super::ingest::{IngestStats, IngestionLoop, WorkerHandle};
use super::recorder::{CsvRecorder, RecordFormat};
use super::Session;
use crate::config::{Config, LinkConfig};
use crate::display::DisplaySink;
use crate::error::{Result, TelemetryError};
use crate::link::SharedLink;
use crate::telemetry::{Sample, SampleDecoder};

/// Operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Clear,
    Close,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "clear" => Ok(Command::Clear),
            "close" | "quit" | "exit" => Ok(Command::Close),
            other => Err(format!(
                "unknown command '{}' (expected start, stop, clear or close)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// The session currently receiving
struct ActiveSession {
    session: Session,
    drain: DrainLoop,
    worker: WorkerHandle,
}

/// Coordinates sessions, the ingestion worker, the drain tick and the display
pub struct SessionController<D: DisplaySink> {
    link: SharedLink,
    link_config: LinkConfig,
    format: RecordFormat,
    decoder: SampleDecoder,
    drain_period: std::time::Duration,
    display: D,
    series: Vec<Sample>,
    active: Option<ActiveSession>,
    /// Workers of stopped sessions, joined once they exit
    retired: Vec<WorkerHandle>,
}

impl<D: DisplaySink> SessionController<D> {
    pub fn new(link: SharedLink, config: &Config, display: D) -> Self {
        Self {
            link,
            link_config: config.link.clone(),
            format: RecordFormat::from(&config.session),
            decoder: SampleDecoder::from_field(config.decoder.field.as_deref()),
            drain_period: config.session.drain_period(),
            display,
            series: Vec::new(),
            active: None,
            retired: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.active {
            Some(_) => SessionState::Running,
            None => SessionState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// The plotted series
    pub fn series(&self) -> &[Sample] {
        &self.series
    }

    /// Output file of the running session
    pub fn output_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.session.output_path())
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Start a new session
    ///
    /// A running session is stopped first; its worker finishes its current
    /// receive in the background and writes nothing more.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the session file cannot be created, or `Io`
    /// if the worker thread cannot be spawned. The controller is `Idle`
    /// afterwards.
    pub fn start(&mut self) -> Result<PathBuf> {
        if let Some(previous) = self.active.take() {
            info!(
                "Restarting: stopping session {}",
                previous.session.output_path().display()
            );
            previous.session.halt();
            self.retired.push(previous.worker);
            self.display.session_stopped();
        }

        self.series.clear();
        self.display.render(&self.series);

        let now = Local::now();
        let recorder = CsvRecorder::create(&self.format, &now)?;
        self.launch(recorder, now)
    }

    /// Spawn the worker for a fresh session writing through `recorder`
    fn launch(&mut self, recorder: CsvRecorder, now: DateTime<Local>) -> Result<PathBuf> {
        let path = recorder.path().to_path_buf();
        let session = Session::begin(path.clone(), now);

        let (tx, rx) = handoff::channel();
        let worker = IngestionLoop::new(
            self.link.clone(),
            session.clone(),
            recorder,
            self.decoder.clone(),
            tx,
            &self.link_config,
        )
        .spawn()?;

        info!(
            "Session started at {}, writing {}",
            session.started_wall().format("%H:%M:%S"),
            path.display()
        );
        self.active = Some(ActiveSession {
            session,
            drain: DrainLoop::new(rx),
            worker,
        });

        self.display.session_started(&path);
        Ok(path)
    }

    /// Stop the running session
    ///
    /// Samples already queued are moved into the series so the view matches
    /// the file. The file stays on disk.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            debug!("Stop requested while idle");
            return;
        };

        active.session.halt();
        let flushed = active.drain.drain_all(&mut self.series, &mut self.display);
        if flushed > 0 {
            debug!("Flushed {} queued samples on stop", flushed);
        }
        self.retired.push(active.worker);

        info!(
            "Session stopped ({} samples plotted), file kept at {}",
            self.series.len(),
            active.session.output_path().display()
        );
        self.display.session_stopped();
    }

    /// Empty the plotted series
    pub fn clear(&mut self) {
        self.series.clear();
        self.display.render(&self.series);
        info!("Plot cleared.");
    }

    /// One drain period elapsed
    ///
    /// Moves at most one sample to the display, then checks on the worker.
    /// Does nothing while idle.
    pub fn tick(&mut self) {
        let worker_done = match self.active.as_mut() {
            Some(active) => {
                active.drain.tick(&mut self.series, &mut self.display);
                active.worker.is_finished()
            }
            None => false,
        };

        if worker_done {
            if let Some(active) = self.active.take() {
                self.end_failed_session(active);
            }
        }

        self.reap_retired();
    }

    /// Apply one operator command
    ///
    /// Returns `Break` on `Close`; the caller should then `shutdown`.
    pub fn handle(&mut self, command: Command) -> ControlFlow<()> {
        debug!("Command: {:?}", command);
        match command {
            Command::Start => {
                if let Err(e) = self.start() {
                    error!("Failed to start session: {}", e);
                    self.display.report_error(&e);
                }
            }
            Command::Stop => self.stop(),
            Command::Clear => self.clear(),
            Command::Close => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Stop and wait for every worker to exit
    ///
    /// Blocks for at most one receive timeout plus one backoff.
    pub fn shutdown(mut self) {
        self.stop();
        for worker in self.retired.drain(..) {
            log_worker_exit(worker.join());
        }
        info!("Shutdown complete");
    }

    /// Drive the controller until `Close` or until `commands` closes
    ///
    /// The drain tick fires every drain period, only while a session runs.
    /// The final `shutdown` runs on the blocking pool.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>)
    where
        D: Send + 'static,
    {
        let mut drain_tick = interval(self.drain_period);
        drain_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = drain_tick.tick(), if self.is_running() => self.tick(),
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).is_break() {
                            info!("Close requested");
                            break;
                        }
                    }
                    None => {
                        info!("Command source closed");
                        break;
                    }
                },
            }
        }

        if let Err(e) = tokio::task::spawn_blocking(move || self.shutdown()).await {
            error!("Shutdown task failed: {}", e);
        }
    }

    fn end_failed_session(&mut self, mut active: ActiveSession) {
        active.session.halt();
        active.drain.drain_all(&mut self.series, &mut self.display);

        let error = match active.worker.join() {
            Ok(Err(e)) => e,
            Ok(Ok(stats)) => {
                warn!("Ingestion worker exited on its own: {:?}", stats);
                self.display.session_stopped();
                return;
            }
            Err(_) => TelemetryError::WorkerPanicked,
        };

        error!(
            "Session {} ended: {}",
            active.session.output_path().display(),
            error
        );
        self.display.report_error(&error);
        self.display.session_stopped();
    }

    fn reap_retired(&mut self) {
        if self.retired.is_empty() {
            return;
        }
        let (done, pending): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(|w| w.is_finished());
        self.retired = pending;
        for worker in done {
            log_worker_exit(worker.join());
        }
    }
}

fn log_worker_exit(joined: thread::Result<Result<IngestStats>>) {
    match joined {
        Ok(Ok(stats)) => debug!("Retired worker exited: {:?}", stats),
        Ok(Err(e)) => warn!("Retired worker exited with error: {}", e),
        Err(_) => error!("Retired worker panicked"),
    }
}
