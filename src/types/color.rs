//! Seat colors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Result, StuntError};

/// ARGB color parsed from `#RRGGBB` or `#AARRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub alpha: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const BLUE: Color = Color::rgb(0x00, 0x00, 0xFF);
    pub const RED: Color = Color::rgb(0xFF, 0x00, 0x00);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { alpha: 0xFF, red, green, blue }
    }

    /// Parse a hex color string
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || StuntError::InvalidColor { value: input.to_string() };
        let hex = input.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        let [a, r, g, b] = value.to_be_bytes();
        match hex.len() {
            6 => Ok(Color::rgb(r, g, b)),
            8 => Ok(Color { alpha: a, red: r, green: g, blue: b }),
            _ => Err(invalid()),
        }
    }

    /// Parse, falling back to `default` for anything unparsable
    pub fn parse_or(input: &str, default: Color) -> Self {
        Self::parse(input).unwrap_or(default)
    }

    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha == 0xFF {
            write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
        } else {
            write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.alpha, self.red, self.green, self.blue)
        }
    }
}

impl FromStr for Color {
    type Err = StuntError;

    fn from_str(s: &str) -> Result<Self> {
        Color::parse(s)
    }
}

impl TryFrom<String> for Color {
    type Error = StuntError;

    fn try_from(value: String) -> Result<Self> {
        Color::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Colors assigned by seat parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatPalette {
    pub even: Color,
    pub odd: Color,
}

impl Default for SeatPalette {
    fn default() -> Self {
        Self { even: Color::BLUE, odd: Color::RED }
    }
}

impl SeatPalette {
    pub fn color_for(&self, seat_is_even: bool) -> Color {
        if seat_is_even { self.even } else { self.odd }
    }
}
