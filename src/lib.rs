//! # LoRa Telemetry Library
//!
//! Receive sensor readings over a LoRa radio link, log them per session to
//! CSV and feed a live display.
//!
//! A dedicated worker thread receives, decodes, timestamps and persists each
//! reading, then hands it over an ordered channel to a periodic drain tick
//! that updates the display. The display never waits on the radio, and a
//! malformed packet never costs an already-recorded sample.

pub mod config;
pub mod display;
pub mod error;
pub mod link;
pub mod session;
pub mod telemetry;
