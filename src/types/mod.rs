//! Value types shared across the engine.
//!
//! Everything here is an immutable value copied by whoever needs it:
//! - [`Seat`] is parsed once from free-form text and never changes
//! - [`FlashPattern`] is derived from a seat parity and a frequency
//! - [`FlashTiming`] and [`CycleTiming`] describe one oscillator run
//! - [`Phase`] names the half of the cycle that is lit
//! - [`Color`] and [`SeatPalette`] map parity to a screen color
//!
//! ```rust
//! use cardstunt::types::{Seat, FlashTiming, Phase};
//!
//! let seat = Seat::parse("A-5-12").unwrap();
//! let timing = FlashTiming::new(1, 0.5, 10_000);
//! let phase = timing.cycle().initial_phase(12_500 - timing.reference_timestamp);
//!
//! assert_eq!(phase, Phase::EvenOnOddOff);
//! assert!(phase.should_flash(seat.is_even()));
//! ```

mod color;
mod pattern;
mod seat;
mod timing;

pub use color::{Color, SeatPalette};
pub use pattern::{FlashPattern, Phase};
pub use seat::{EventDetails, Seat};
pub use timing::{CycleTiming, FlashTiming};
