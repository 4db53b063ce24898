//! # Ingestion Loop
//!
//! The producer side of a session, run on its own OS thread so the display
//! never waits on the radio.
//!
//! Each iteration:
//! 1. Receive one payload (blocks for up to the receive timeout)
//! 2. Decode it; malformed payloads are logged and dropped
//! 3. Stamp, append to the session file, then hand off to the drain tick
//! 4. Back off before the next receive
//!
//! The loop checks the session's running flag between receives. A receive
//! in flight is never interrupted; a payload that arrives after the session
//! was stopped is discarded without being written.

use bytes::Bytes;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use super::handoff::HandoffSender;
use super::recorder::CsvRecorder;
use super::Session;
use crate::config::LinkConfig;
use crate::error::{Result, TelemetryError};
use crate::link::SharedLink;
use crate::telemetry::SampleDecoder;

/// Name given to ingestion worker threads
const WORKER_THREAD_NAME: &str = "lora-ingest";

/// Counters reported when a worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Samples decoded, persisted and handed off
    pub accepted: u64,
    /// Payloads dropped as undecodable
    pub malformed: u64,
    /// Receives that timed out with nothing
    pub empty: u64,
    /// Receives that failed with a link error
    pub link_errors: u64,
}

/// Handle to a running ingestion worker
pub type WorkerHandle = JoinHandle<Result<IngestStats>>;

/// Producer loop for one session
pub struct IngestionLoop {
    link: SharedLink,
    session: Session,
    recorder: CsvRecorder,
    decoder: SampleDecoder,
    handoff: HandoffSender,
    receive_timeout: Duration,
    backoff: Duration,
    stats: IngestStats,
}

impl IngestionLoop {
    pub fn new(
        link: SharedLink,
        session: Session,
        recorder: CsvRecorder,
        decoder: SampleDecoder,
        handoff: HandoffSender,
        link_config: &LinkConfig,
    ) -> Self {
        Self {
            link,
            session,
            recorder,
            decoder,
            handoff,
            receive_timeout: link_config.receive_timeout(),
            backoff: link_config.backoff(),
            stats: IngestStats::default(),
        }
    }

    /// Run the loop on a dedicated thread
    ///
    /// # Errors
    ///
    /// Returns `Io` if the thread cannot be spawned
    pub fn spawn(self) -> Result<WorkerHandle> {
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Run until the session stops or a fatal error occurs
    ///
    /// Decode failures, timeouts and link read errors are handled inside the
    /// loop. Persistence and handoff failures end it: the session is halted
    /// and the error returned.
    pub fn run(mut self) -> Result<IngestStats> {
        info!(
            "Ingestion started for {} (timeout {:?}, backoff {:?})",
            self.session.output_path().display(),
            self.receive_timeout,
            self.backoff
        );

        let result = self.run_until_stopped();
        if let Err(e) = &result {
            self.session.halt();
            error!("Ingestion aborted: {}", e);
        }

        info!(
            "Ingestion stopped: {} accepted, {} malformed, {} empty receives, {} link errors ({} records in {})",
            self.stats.accepted,
            self.stats.malformed,
            self.stats.empty,
            self.stats.link_errors,
            self.recorder.records(),
            self.recorder.path().display()
        );

        result.map(|_| self.stats)
    }

    fn run_until_stopped(&mut self) -> Result<()> {
        while self.session.is_running() {
            self.step()?;
            if self.session.is_running() {
                thread::sleep(self.backoff);
            }
        }
        Ok(())
    }

    /// One receive-decode-persist-handoff cycle
    fn step(&mut self) -> Result<()> {
        let payload = match self.receive() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.stats.empty += 1;
                trace!("No payload within {:?}", self.receive_timeout);
                return Ok(());
            }
            Err(TelemetryError::Link(msg)) => {
                self.stats.link_errors += 1;
                warn!("Link receive failed: {}", msg);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if !self.session.is_running() {
            debug!(
                "Session stopped during receive, discarding {} byte payload",
                payload.len()
            );
            return Ok(());
        }

        let value = match self.decoder.decode(&payload) {
            Ok(value) => value,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(
                    "Dropping payload {:?}: {} ({} dropped so far)",
                    String::from_utf8_lossy(&payload),
                    e,
                    self.stats.malformed
                );
                return Ok(());
            }
        };

        let sample = self.session.stamp(value);

        // Record hits the file before the display sees it
        self.recorder.append(&sample)?;

        if self.handoff.send(sample).is_err() {
            if self.session.is_running() {
                return Err(TelemetryError::HandoffClosed);
            }
            debug!("Display detached after stop, sample kept in file only");
            return Ok(());
        }

        self.stats.accepted += 1;
        debug!(
            "Accepted t={}s value={}",
            sample.elapsed_seconds(),
            sample.value()
        );
        Ok(())
    }

    fn receive(&self) -> Result<Option<Bytes>> {
        // A poisoned lock means a previous worker panicked mid-receive
        let mut link = self
            .link
            .lock()
            .map_err(|_| TelemetryError::WorkerPanicked)?;
        link.receive(self.receive_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::link::mocks::{ScriptedLink, Step};
    use crate::link::shared;
    use crate::session::handoff;
    use crate::session::recorder::RecordFormat;
    use crate::telemetry::Sample;
    use chrono::Local;
    use std::time::Instant;
    use tempfile::TempDir;

    fn fast_link_config() -> LinkConfig {
        LinkConfig {
            receive_timeout_ms: 20,
            backoff_ms: 5,
            ..LinkConfig::default()
        }
    }

    struct Harness {
        _dir: TempDir,
        session: Session,
        ingest: IngestionLoop,
        rx: handoff::HandoffReceiver,
    }

    fn harness(link: ScriptedLink) -> Harness {
        let dir = TempDir::new().unwrap();
        let format = RecordFormat::from(&SessionConfig {
            output_dir: dir.path().to_string_lossy().into_owned(),
            ..SessionConfig::default()
        });
        let now = Local::now();
        let recorder = CsvRecorder::create(&format, &now).unwrap();
        let session = Session::begin(recorder.path().to_path_buf(), now);
        let (tx, rx) = handoff::channel();
        let ingest = IngestionLoop::new(
            shared(link),
            session.clone(),
            recorder,
            SampleDecoder::Scalar,
            tx,
            &fast_link_config(),
        );
        Harness {
            _dir: dir,
            session,
            ingest,
            rx,
        }
    }

    fn data_lines(session: &Session) -> Vec<String> {
        std::fs::read_to_string(session.output_path())
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    fn drain(rx: &mut handoff::HandoffReceiver) -> Vec<Sample> {
        let mut out = Vec::new();
        while let Ok(sample) = rx.try_recv() {
            out.push(sample);
        }
        out
    }

    /// Stop the session once every scripted step has been fully processed
    ///
    /// Must be called before the loop starts receiving.
    fn stop_when_consumed(link: &ScriptedLink, session: &Session) -> thread::JoinHandle<()> {
        let steps = link.remaining();
        let link = link.clone();
        let session = session.clone();
        thread::spawn(move || {
            // One receive past the script means the last step is done
            while link.receive_calls() <= steps {
                thread::sleep(Duration::from_millis(2));
            }
            session.halt();
        })
    }

    #[test]
    fn test_scenario_valid_timeout_bogus_valid() {
        let link = ScriptedLink::new(vec![
            Step::payload(b"21.50"),
            Step::Timeout,
            Step::payload(b"bogus"),
            Step::payload(b"21.75"),
        ]);
        let Harness { _dir, session, ingest, mut rx } = harness(link.clone());
        let stopper = stop_when_consumed(&link, &session);

        let stats = ingest.run().unwrap();
        stopper.join().unwrap();

        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.malformed, 1);
        assert!(stats.empty >= 1);

        let lines = data_lines(&session);
        assert_eq!(lines.len(), 2, "file: {:?}", lines);
        assert!(lines[0].ends_with(";21.5"));
        assert!(lines[1].ends_with(";21.75"));

        let samples = drain(&mut rx);
        let values: Vec<f64> = samples.iter().map(|s| s.value()).collect();
        assert_eq!(values, vec![21.5, 21.75]);
        assert!(samples[0].elapsed_seconds() <= samples[1].elapsed_seconds());

        // File and channel carry the same timestamps
        for (line, sample) in lines.iter().zip(&samples) {
            let (t, _) = line.split_once(';').unwrap();
            assert_eq!(t.parse::<f64>().unwrap(), sample.elapsed_seconds());
        }
    }

    #[test]
    fn test_malformed_payloads_are_not_persisted() {
        let link = ScriptedLink::new(vec![
            Step::payload(b"abc"),
            Step::payload(b""),
            Step::Payload(Bytes::from_static(&[0xFF, 0x00])),
        ]);
        let Harness { _dir, session, ingest, mut rx } = harness(link.clone());
        let stopper = stop_when_consumed(&link, &session);

        let stats = ingest.run().unwrap();
        stopper.join().unwrap();

        assert_eq!(stats.accepted, 0);
        assert_eq!(stats.malformed, 3);
        assert!(data_lines(&session).is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_order_preserved_for_many_payloads() {
        let steps: Vec<Step> = (0..20)
            .map(|i| {
                if i % 3 == 0 {
                    Step::Payload(Bytes::from(format!("x{}", i)))
                } else {
                    Step::Payload(Bytes::from(format!("{}.5", i)))
                }
            })
            .collect();
        let link = ScriptedLink::new(steps);
        let Harness { _dir, session, ingest, mut rx } = harness(link.clone());
        let stopper = stop_when_consumed(&link, &session);

        ingest.run().unwrap();
        stopper.join().unwrap();

        let expected: Vec<f64> = (0..20)
            .filter(|i| i % 3 != 0)
            .map(|i| i as f64 + 0.5)
            .collect();
        let persisted: Vec<f64> = data_lines(&session)
            .iter()
            .map(|l| l.split_once(';').unwrap().1.parse().unwrap())
            .collect();
        let handed_off: Vec<f64> = drain(&mut rx).iter().map(|s| s.value()).collect();

        assert_eq!(persisted, expected);
        assert_eq!(handed_off, expected);
    }

    #[test]
    fn test_link_errors_are_recovered() {
        let link = ScriptedLink::new(vec![
            Step::Fail("framing error".to_string()),
            Step::payload(b"18.0"),
        ]);
        let Harness { _dir, session, ingest, mut rx } = harness(link.clone());
        let stopper = stop_when_consumed(&link, &session);

        let stats = ingest.run().unwrap();
        stopper.join().unwrap();

        assert_eq!(stats.link_errors, 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_stop_mid_receive_discards_late_payload() {
        let link = ScriptedLink::new(vec![Step::Delayed(
            Duration::from_millis(150),
            Bytes::from_static(b"30.0"),
        )]);
        let Harness { _dir, session, ingest, mut rx } = harness(link.clone());

        let started = Instant::now();
        let worker = ingest.spawn().unwrap();
        thread::sleep(Duration::from_millis(30));
        session.halt();

        let stats = worker.join().unwrap().unwrap();
        let elapsed = started.elapsed();

        // Bounded by the in-flight receive plus one backoff
        assert!(elapsed < Duration::from_millis(150 + 5 + 500), "took {:?}", elapsed);
        assert_eq!(stats.accepted, 0);
        assert!(data_lines(&session).is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_stop_during_timeout_ends_loop() {
        let link = ScriptedLink::new(vec![]);
        let Harness { _dir, session, ingest, .. } = harness(link.clone());

        let worker = ingest.spawn().unwrap();
        thread::sleep(Duration::from_millis(60));
        session.halt();

        let stats = worker.join().unwrap().unwrap();
        assert!(stats.empty >= 1);
        let calls = link.receive_calls();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(link.receive_calls(), calls, "worker kept receiving after stop");
    }

    #[test]
    fn test_handoff_closed_while_running_is_fatal() {
        let link = ScriptedLink::new(vec![Step::payload(b"21.0")]);
        let Harness { _dir, session, ingest, rx } = harness(link);
        drop(rx);

        let result = ingest.run();

        assert!(matches!(result, Err(TelemetryError::HandoffClosed)));
        assert!(!session.is_running(), "fatal error must halt the session");
        // The sample was persisted before the handoff failed
        assert_eq!(data_lines(&session).len(), 1);
    }

    #[test]
    fn test_timestamps_are_relative_to_session_start() {
        let link = ScriptedLink::new(vec![Step::Delayed(
            Duration::from_millis(200),
            Bytes::from_static(b"1.0"),
        )]);
        let Harness { _dir, session, ingest, mut rx } = harness(link.clone());
        let stopper = stop_when_consumed(&link, &session);

        ingest.run().unwrap();
        stopper.join().unwrap();

        let samples = drain(&mut rx);
        assert_eq!(samples.len(), 1);
        let t = samples[0].elapsed_seconds();
        assert!((0.2..1.0).contains(&t), "elapsed {} not close to 0.2s", t);
    }
}
