//! Flash pattern descriptor and cycle phase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which half of the alternating cycle is lit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Even seats lit, odd seats dark
    EvenOnOddOff,
    /// Even seats dark, odd seats lit
    EvenOffOddOn,
    /// Idle; no seat is lit
    Stopped,
}

impl Phase {
    /// Whether a seat of the given parity is lit in this phase
    pub fn should_flash(self, seat_is_even: bool) -> bool {
        match self {
            Phase::EvenOnOddOff => seat_is_even,
            Phase::EvenOffOddOn => !seat_is_even,
            Phase::Stopped => false,
        }
    }

    /// The other half of the cycle; `Stopped` stays stopped
    pub fn flipped(self) -> Self {
        match self {
            Phase::EvenOnOddOff => Phase::EvenOffOddOn,
            Phase::EvenOffOddOn => Phase::EvenOnOddOff,
            Phase::Stopped => Phase::Stopped,
        }
    }

    pub fn is_stopped(self) -> bool {
        self == Phase::Stopped
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::EvenOnOddOff => "EVEN_ON_ODD_OFF",
            Phase::EvenOffOddOn => "EVEN_OFF_ODD_ON",
            Phase::Stopped => "STOPPED",
        };
        f.write_str(label)
    }
}

/// Derived flash behaviour for one seat
///
/// Recomputed whenever the seat or the frequency changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlashPattern {
    pub is_even_seat: bool,
    pub frequency: u32,
    pub duty_cycle: f64,
    pub should_flash_in_even_phase: bool,
}

impl FlashPattern {
    /// Human readable summary, e.g. `Even seat: Flash during first phase at 2Hz`
    pub fn description(&self) -> String {
        let seat_type = if self.is_even_seat { "Even" } else { "Odd" };
        let phase = if self.should_flash_in_even_phase { "first phase" } else { "second phase" };
        format!("{} seat: Flash during {} at {}Hz", seat_type, phase, self.frequency)
    }
}
