//! Cooperative periodic scheduler.
//!
//! Every periodic component embeds a [`Cadence`] and gets polled once per
//! outer loop iteration.  The cadence accumulates wrap-safe elapsed time and
//! fires when the accumulator reaches the configured interval:
//!
//! ```text
//!                 ┌─────────────────────────────┐
//!   outer loop ──▶│ Cadence::tick(now_ms)       │
//!   (every pass)  │   accrued += elapsed        │
//!                 │   accrued >= interval ?     │──▶ Some(window) → update()
//!                 │     yes: reset accrued to 0 │
//!                 │     no:  keep accumulating  │──▶ None
//!                 └─────────────────────────────┘
//! ```
//!
//! The reset is a full reset to zero, not `accrued -= interval`: a loop pass
//! that arrives late (for example after a host-link transaction stalled the
//! loop) produces exactly one fire, never a burst of catch-up fires.  The
//! fire reports the real accumulated window so consumers that integrate over
//! time (the fan monitor's RPM math) use the true span rather than the
//! nominal interval.

use crate::clock::elapsed_ms;

/// Per-component periodic trigger.
#[derive(Debug, Clone)]
pub struct Cadence {
    /// Fire threshold in milliseconds.
    interval_ms: u32,
    /// Time accumulated since the last fire.
    accrued_ms: u32,
    /// Clock sample from the previous `tick` call.
    prev_sample_ms: u32,
}

impl Cadence {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            accrued_ms: 0,
            prev_sample_ms: 0,
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Advance the accumulator to `now_ms`.
    ///
    /// Returns `Some(window_ms)` exactly when the accumulated time reaches
    /// the interval, where `window_ms` is the accumulated span being
    /// consumed; returns `None` otherwise.  The clock sample is stored
    /// either way, so a late caller is never charged twice for the same
    /// span.  At most one fire per call.
    pub fn tick(&mut self, now_ms: u32) -> Option<u32> {
        let elapsed = elapsed_ms(self.prev_sample_ms, now_ms);
        self.prev_sample_ms = now_ms;
        self.accrued_ms = self.accrued_ms.saturating_add(elapsed);

        if self.accrued_ms >= self.interval_ms {
            let window = self.accrued_ms;
            self.accrued_ms = 0;
            Some(window)
        } else {
            None
        }
    }
}
