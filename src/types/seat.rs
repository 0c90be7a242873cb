//! Seat assignment parsing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Result, StuntError};

/// A parsed venue seat
///
/// Immutable once parsed. The seat number decides the parity that every
/// flash and color mapping derives from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seat {
    section: String,
    row: u32,
    number: u32,
}

impl Seat {
    /// Build a seat from already validated parts
    ///
    /// The section is upper-cased; row and number must be positive.
    pub fn new(section: impl Into<String>, row: u32, number: u32) -> Result<Self> {
        let section = section.into().trim().to_uppercase();
        let shown = format!("{}-{}-{}", section, row, number);
        if section.is_empty() {
            return Err(StuntError::invalid_seat(shown, "section is empty"));
        }
        if row == 0 {
            return Err(StuntError::invalid_seat(shown, "row must be positive"));
        }
        if number == 0 {
            return Err(StuntError::invalid_seat(shown, "seat number must be positive"));
        }
        Ok(Self { section, row, number })
    }

    /// Parse free-form seat text
    ///
    /// Accepted forms:
    /// - `Section A, Row 5, Seat 12` (colons optional, any case)
    /// - `A-5-12`
    /// - anything with a letter run followed by two numbers, e.g. `A 5 12`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(StuntError::invalid_seat(input, "seat text is empty"));
        }

        let lower = trimmed.to_lowercase();
        if lower.contains("section") && lower.contains("row") && lower.contains("seat") {
            Self::parse_verbose(trimmed)
        } else if trimmed.contains('-') {
            Self::parse_compact(trimmed)
        } else {
            Self::parse_flexible(trimmed)
        }
    }

    fn parse_verbose(input: &str) -> Result<Self> {
        let tokens = tokenize(input);
        let value_after = |label: &str| -> Option<&Token> {
            let pos = tokens.iter().position(|t| t.is_word(label))?;
            tokens.get(pos + 1)
        };

        let section = match value_after("section") {
            Some(Token::Word(w)) => w.clone(),
            Some(Token::Number(n)) => n.to_string(),
            None => return Err(StuntError::invalid_seat(input, "missing section value")),
        };
        let row = match value_after("row") {
            Some(Token::Number(n)) => *n,
            _ => return Err(StuntError::invalid_seat(input, "missing row number")),
        };
        let number = match value_after("seat") {
            Some(Token::Number(n)) => *n,
            _ => return Err(StuntError::invalid_seat(input, "missing seat number")),
        };

        Self::new(section, row, number).map_err(|e| reparent(e, input))
    }

    fn parse_compact(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.split('-').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(StuntError::invalid_seat(input, "expected SECTION-ROW-SEAT"));
        }

        let row = parts[1]
            .parse::<u32>()
            .map_err(|_| StuntError::invalid_seat(input, format!("row '{}' is not a number", parts[1])))?;
        let number = parts[2].parse::<u32>().map_err(|_| {
            StuntError::invalid_seat(input, format!("seat '{}' is not a number", parts[2]))
        })?;

        Self::new(parts[0], row, number).map_err(|e| reparent(e, input))
    }

    fn parse_flexible(input: &str) -> Result<Self> {
        let tokens = tokenize(input);
        let section = tokens.iter().find_map(|t| match t {
            Token::Word(w) => Some(w.clone()),
            Token::Number(_) => None,
        });
        let numbers: Vec<u32> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Number(n) => Some(*n),
                Token::Word(_) => None,
            })
            .collect();

        match (section, numbers.as_slice()) {
            (Some(section), [row, number, ..]) => {
                Self::new(section, *row, *number).map_err(|e| reparent(e, input))
            }
            _ => Err(StuntError::invalid_seat(input, "expected a section and two numbers")),
        }
    }

    /// Section label, upper-cased
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Row number
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Seat number within the row
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Parity bit: true for even seat numbers
    pub fn is_even(&self) -> bool {
        self.number % 2 == 0
    }

    /// Stable key used for remote lookups, e.g. `A_5_12`
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.section, self.row, self.number)
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Section {}, Row {}, Seat {}", self.section, self.row, self.number)
    }
}

impl FromStr for Seat {
    type Err = StuntError;

    fn from_str(s: &str) -> Result<Self> {
        Seat::parse(s)
    }
}

/// Event name and venue entered alongside the seat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub name: String,
    pub venue: String,
    pub additional_info: Option<String>,
}

impl EventDetails {
    /// Split `"name, venue"` on the first comma
    pub fn parse(input: &str) -> Self {
        let mut parts = input.splitn(2, ',');
        let name = parts.next().map(str::trim).unwrap_or_default().to_string();
        let venue = parts.next().map(str::trim).unwrap_or_default().to_string();
        Self { name, venue, additional_info: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(u32),
}

impl Token {
    fn is_word(&self, label: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(label))
    }
}

/// Split into alphanumeric runs, separating letter runs from digit runs
fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        if current.is_empty() {
            return;
        }
        let run = std::mem::take(current);
        // Overlong digit runs stay words so they never fill a number slot
        match run.parse::<u32>() {
            Ok(n) => tokens.push(Token::Number(n)),
            Err(_) => tokens.push(Token::Word(run)),
        }
    };

    for ch in input.chars() {
        if ch.is_alphanumeric() {
            let switches_kind = current
                .chars()
                .last()
                .is_some_and(|last| last.is_ascii_digit() != ch.is_ascii_digit());
            if switches_kind {
                flush(&mut current, &mut tokens);
            }
            current.push(ch);
        } else {
            flush(&mut current, &mut tokens);
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn reparent(error: StuntError, input: &str) -> StuntError {
    match error {
        StuntError::InvalidSeat { reason, .. } => StuntError::invalid_seat(input, reason),
        other => other,
    }
}
