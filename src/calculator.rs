//! Seat parity to flash pattern and color mapping
//!
//! The single source of truth for what a seat does: which phase it lights
//! in, at which frequency and duty cycle, and which color it shows.

use crate::types::{Color, FlashPattern, Phase, Seat, SeatPalette};
use crate::{Result, StuntError};

/// Default flash frequency in Hz
pub const DEFAULT_FREQUENCY: u32 = 2;

/// Default lit fraction of each period
pub const DEFAULT_DUTY_CYCLE: f64 = 0.5;

pub const MIN_FREQUENCY: u32 = 1;
pub const MAX_FREQUENCY: u32 = 10;
pub const MIN_DUTY_CYCLE: f64 = 0.1;
pub const MAX_DUTY_CYCLE: f64 = 0.9;

/// Pure pattern computations for a seat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternCalculator {
    duty_cycle: f64,
    palette: SeatPalette,
}

impl Default for PatternCalculator {
    fn default() -> Self {
        Self { duty_cycle: DEFAULT_DUTY_CYCLE, palette: SeatPalette::default() }
    }
}

impl PatternCalculator {
    /// Calculator with a validated duty cycle and palette
    pub fn new(duty_cycle: f64, palette: SeatPalette) -> Result<Self> {
        Self::validate_duty_cycle(duty_cycle)?;
        Ok(Self { duty_cycle, palette })
    }

    /// Pattern for a seat parity at `frequency`
    pub fn calculate(&self, seat_is_even: bool, frequency: u32) -> FlashPattern {
        FlashPattern {
            is_even_seat: seat_is_even,
            frequency,
            duty_cycle: self.duty_cycle,
            should_flash_in_even_phase: seat_is_even,
        }
    }

    /// Pattern for a parsed seat
    pub fn calculate_for_seat(&self, seat: &Seat, frequency: u32) -> FlashPattern {
        self.calculate(seat.is_even(), frequency)
    }

    pub fn is_valid_frequency(frequency: u32) -> bool {
        (MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency)
    }

    pub fn is_valid_duty_cycle(duty_cycle: f64) -> bool {
        (MIN_DUTY_CYCLE..=MAX_DUTY_CYCLE).contains(&duty_cycle)
    }

    pub fn validate_frequency(frequency: u32) -> Result<u32> {
        if Self::is_valid_frequency(frequency) {
            Ok(frequency)
        } else {
            Err(StuntError::InvalidFrequency { value: frequency })
        }
    }

    pub fn validate_duty_cycle(duty_cycle: f64) -> Result<f64> {
        if Self::is_valid_duty_cycle(duty_cycle) {
            Ok(duty_cycle)
        } else {
            Err(StuntError::InvalidDutyCycle { value: duty_cycle })
        }
    }

    /// Whether the pattern's seat is lit during `phase`
    pub fn should_flash_at_phase(pattern: &FlashPattern, phase: Phase) -> bool {
        phase.should_flash(pattern.is_even_seat)
    }

    /// Screen color for a seat, honoring a remote override when it parses
    pub fn color_for_seat(&self, seat: &Seat, override_color: Option<&str>) -> Color {
        let default = self.palette.color_for(seat.is_even());
        match override_color {
            Some(raw) => Color::parse_or(raw, default),
            None => default,
        }
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn palette(&self) -> SeatPalette {
        self.palette
    }
}
