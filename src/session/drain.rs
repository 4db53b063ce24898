//! # Drain Loop
//!
//! Consumer side of the handoff channel, activated once per drain period on
//! the controller's context.
//!
//! A tick moves at most one sample into the plotted series. A burst from the
//! radio is therefore shown gradually over successive ticks instead of in one
//! redraw.

use super::handoff::HandoffReceiver;
use crate::display::DisplaySink;
use crate::telemetry::Sample;

/// Per-session consumer of the handoff channel
#[derive(Debug)]
pub struct DrainLoop {
    handoff: HandoffReceiver,
}

impl DrainLoop {
    pub fn new(handoff: HandoffReceiver) -> Self {
        Self { handoff }
    }

    /// One periodic activation
    ///
    /// Dequeues a single sample if one is waiting, appends it to `series` and
    /// redraws. Returns the sample moved, or `None` when the tick was a no-op.
    pub fn tick<D: DisplaySink + ?Sized>(
        &mut self,
        series: &mut Vec<Sample>,
        display: &mut D,
    ) -> Option<Sample> {
        let sample = self.handoff.try_recv().ok()?;
        series.push(sample);
        display.render(series);
        display.show_latest(sample.value());
        Some(sample)
    }

    /// Move every waiting sample into `series` with a single redraw
    ///
    /// Used when a session ends, so the view matches the session file.
    pub fn drain_all<D: DisplaySink + ?Sized>(
        &mut self,
        series: &mut Vec<Sample>,
        display: &mut D,
    ) -> usize {
        let mut moved = 0;
        while let Ok(sample) = self.handoff.try_recv() {
            series.push(sample);
            moved += 1;
        }

        if let Some(last) = series.last().copied().filter(|_| moved > 0) {
            display.render(series);
            display.show_latest(last.value());
        }
        moved
    }
}
