//! Cadence derivation from cumulative crank revolution data.
//!
//! Shared by the Cycling Power and CSC decoders. Both services report a
//! 16-bit cumulative revolution count plus a 16-bit event time in 1/1024 s;
//! cadence is the rate between two successive events.

use std::time::{Duration, Instant};

/// Event time resolution (ticks per second).
pub const CRANK_TIME_RESOLUTION: f64 = 1024.0;

/// Revolution deltas at or above this are treated as wrap glitches.
pub const MAX_REVOLUTION_DELTA: u16 = 20;

/// Raw crank revolution fields as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrankRevolutionData {
    /// Cumulative crank revolutions (wraps at 65536)
    pub cumulative_revolutions: u16,
    /// Last crank event time in 1/1024 s (wraps at 65536)
    pub last_event_time: u16,
}

/// Per-characteristic crank state.
///
/// Notifications must be fed in arrival order; a reading processed out of
/// order corrupts the delta for the next one.
#[derive(Debug, Clone)]
pub struct CrankCadence {
    idle_timeout: Duration,
    last: Option<CrankRevolutionData>,
    last_valid_at: Option<Instant>,
}

impl CrankCadence {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            last: None,
            last_valid_at: None,
        }
    }

    /// Feed one crank event received at `now`.
    ///
    /// Returns the cadence to emit, `Some(0)` when the crank has been idle
    /// past the timeout, or `None` to keep the last value.
    pub fn update(&mut self, data: CrankRevolutionData, now: Instant) -> Option<u16> {
        let previous = match self.last.replace(data) {
            Some(previous) => previous,
            None => {
                self.last_valid_at = Some(now);
                return None;
            }
        };

        let rev_delta = data
            .cumulative_revolutions
            .wrapping_sub(previous.cumulative_revolutions);
        let time_ticks = data.last_event_time.wrapping_sub(previous.last_event_time);

        if rev_delta == 0 && time_ticks == 0 {
            let idle = self
                .last_valid_at
                .map(|at| now.saturating_duration_since(at) > self.idle_timeout)
                .unwrap_or(false);
            return if idle { Some(0) } else { None };
        }

        let time_delta = time_ticks as f64 / CRANK_TIME_RESOLUTION;
        if time_delta > 0.0 && rev_delta > 0 && rev_delta < MAX_REVOLUTION_DELTA {
            self.last_valid_at = Some(now);
            let rpm = (rev_delta as f64 / time_delta * 60.0).round();
            return Some(rpm.min(u16::MAX as f64) as u16);
        }

        None
    }

    /// Forget the previous event (new connection).
    pub fn reset(&mut self) {
        self.last = None;
        self.last_valid_at = None;
    }
}
