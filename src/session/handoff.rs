//! Ordered handoff of samples from the ingestion worker to the drain tick.
//!
//! Unbounded and FIFO. The sending side is used from a plain OS thread, the
//! receiving side is polled without awaiting, so no runtime is needed on
//! either end.

use tokio::sync::mpsc;

use crate::telemetry::Sample;

pub type HandoffSender = mpsc::UnboundedSender<Sample>;
pub type HandoffReceiver = mpsc::UnboundedReceiver<Sample>;

/// Create the channel for one session
pub fn channel() -> (HandoffSender, HandoffReceiver) {
    mpsc::unbounded_channel()
}
