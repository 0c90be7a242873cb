//! Oscillator timing derived from a shared reference

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Phase;

/// Timing input for one scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlashTiming {
    /// Flashes per second, 1-10
    pub frequency: u32,
    /// Lit fraction of each period, 0.1-0.9
    pub duty_cycle: f64,
    /// Shared monotonic instant (ms) all devices anchor to
    pub reference_timestamp: i64,
}

impl FlashTiming {
    pub fn new(frequency: u32, duty_cycle: f64, reference_timestamp: i64) -> Self {
        Self { frequency, duty_cycle, reference_timestamp }
    }

    /// Timing anchored to the local clock origin
    ///
    /// Used when no shared reference is available; devices then only agree
    /// as far as their local clocks happen to agree.
    pub fn local(frequency: u32, duty_cycle: f64) -> Self {
        Self::new(frequency, duty_cycle, 0)
    }

    /// Period, lit and dark durations for this timing
    pub fn cycle(&self) -> CycleTiming {
        CycleTiming::new(self.frequency, self.duty_cycle)
    }
}

/// Millisecond durations of one oscillator cycle
///
/// A full cycle is two periods: one for each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub period_ms: u64,
    pub on_ms: u64,
    pub off_ms: u64,
}

impl CycleTiming {
    /// Frequency zero is treated as 1 Hz; callers validate upstream
    pub fn new(frequency: u32, duty_cycle: f64) -> Self {
        let period_ms = 1000 / u64::from(frequency.max(1));
        let on_ms = ((period_ms as f64) * duty_cycle).round().clamp(0.0, period_ms as f64) as u64;
        let off_ms = period_ms - on_ms;
        Self { period_ms, on_ms, off_ms }
    }

    pub fn full_cycle_ms(&self) -> u64 {
        self.period_ms * 2
    }

    /// Position within the global cycle after `elapsed_ms` since the reference
    ///
    /// Negative elapsed time (reference in the future) wraps the same way.
    pub fn cycle_position(&self, elapsed_ms: i64) -> u64 {
        elapsed_ms.rem_euclid(self.full_cycle_ms() as i64) as u64
    }

    /// Phase a device joining `elapsed_ms` after the reference starts in
    pub fn initial_phase(&self, elapsed_ms: i64) -> Phase {
        if self.cycle_position(elapsed_ms) < self.period_ms {
            Phase::EvenOnOddOff
        } else {
            Phase::EvenOffOddOn
        }
    }

    /// How long a slot lasts: lit slots hold for `on_ms`, dark slots for `off_ms`
    pub fn slot_duration(&self, lit: bool) -> Duration {
        Duration::from_millis(if lit { self.on_ms } else { self.off_ms })
    }
}
