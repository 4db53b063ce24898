//! # Radio Link Module
//!
//! Abstraction over the LoRa receive capability.
//!
//! The pipeline only needs "give me one payload within this timeout, or
//! nothing". `LinkAdapter` captures that contract so the ingestion loop can be
//! driven by real hardware ([`serial::SerialLink`]) or by a scripted link in
//! tests.

pub mod serial;

use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Result;

pub use serial::SerialLink;

/// Trait for radio link operations
pub trait LinkAdapter: Send {
    /// Block for up to `timeout` waiting for one payload
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>>;

    /// Broadcast one payload
    fn send(&mut self, payload: &[u8]) -> Result<()>;
}

/// Link shared between successive sessions
///
/// Each ingestion worker locks it for one `receive` at a time.
pub type SharedLink = Arc<Mutex<Box<dyn LinkAdapter>>>;

/// Wrap a link so it can be handed to session workers
pub fn shared<L: LinkAdapter + 'static>(link: L) -> SharedLink {
    Arc::new(Mutex::new(Box::new(link)))
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::TelemetryError;
    use std::collections::VecDeque;
    use std::thread;

    /// One scripted outcome of a `receive` call
    #[derive(Debug, Clone)]
    pub enum Step {
        /// Return this payload immediately
        Payload(Bytes),
        /// Block for the full timeout and return nothing
        Timeout,
        /// Block for the given time, then return the payload
        Delayed(Duration, Bytes),
        /// Fail with a link error
        Fail(String),
    }

    impl Step {
        pub fn payload(data: &'static [u8]) -> Self {
            Step::Payload(Bytes::from_static(data))
        }
    }

    /// Mock radio link replaying a fixed script
    ///
    /// Once the script is exhausted every call behaves like a timeout.
    #[derive(Clone)]
    pub struct ScriptedLink {
        pub script: Arc<Mutex<VecDeque<Step>>>,
        pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
        pub receive_calls: Arc<Mutex<usize>>,
    }

    impl ScriptedLink {
        pub fn new(steps: Vec<Step>) -> Self {
            Self {
                script: Arc::new(Mutex::new(steps.into())),
                sent: Arc::new(Mutex::new(Vec::new())),
                receive_calls: Arc::new(Mutex::new(0)),
            }
        }

        pub fn push(&self, step: Step) {
            self.script.lock().unwrap().push_back(step);
        }

        pub fn remaining(&self) -> usize {
            self.script.lock().unwrap().len()
        }

        pub fn receive_calls(&self) -> usize {
            *self.receive_calls.lock().unwrap()
        }

        pub fn get_sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl LinkAdapter for ScriptedLink {
        fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
            *self.receive_calls.lock().unwrap() += 1;
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Payload(data)) => Ok(Some(data)),
                Some(Step::Delayed(delay, data)) => {
                    thread::sleep(delay);
                    Ok(Some(data))
                }
                Some(Step::Fail(msg)) => Err(TelemetryError::Link(msg)),
                Some(Step::Timeout) | None => {
                    thread::sleep(timeout);
                    Ok(None)
                }
            }
        }

        fn send(&mut self, payload: &[u8]) -> Result<()> {
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_scripted_link_replays_in_order() {
        let mut link = ScriptedLink::new(vec![
            Step::payload(b"1"),
            Step::Timeout,
            Step::payload(b"2"),
        ]);
        let timeout = Duration::from_millis(1);

        assert_eq!(link.receive(timeout).unwrap(), Some(Bytes::from_static(b"1")));
        assert_eq!(link.receive(timeout).unwrap(), None);
        assert_eq!(link.receive(timeout).unwrap(), Some(Bytes::from_static(b"2")));
        assert_eq!(link.receive(timeout).unwrap(), None);
        assert_eq!(link.receive_calls(), 4);
    }

    #[test]
    fn test_shared_link_is_usable_through_lock() {
        let scripted = ScriptedLink::new(vec![Step::payload(b"7")]);
        let link = shared(scripted.clone());

        link.lock().unwrap().send(b"ping").unwrap();
        let got = link.lock().unwrap().receive(Duration::from_millis(1)).unwrap();

        assert_eq!(got, Some(Bytes::from_static(b"7")));
        assert_eq!(scripted.get_sent(), vec![b"ping".to_vec()]);
    }
}
