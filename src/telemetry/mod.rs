//! # Telemetry Module
//!
//! Sample type and payload decoding for LoRa sensor telemetry.
//!
//! This module handles:
//! - The `Sample` value carried from the radio to the display
//! - Decoding raw radio payloads (plain scalars or `name = value unit` fields)

pub mod decoder;
pub mod sample;

pub use decoder::{decode, DecodeError, SampleDecoder};
pub use sample::Sample;
