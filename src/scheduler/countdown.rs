//! Scheduled show start
//!
//! Start times are a time of day on the device's local clock, compared at
//! second resolution. A start time that has already passed today is due
//! immediately.

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike};
use std::fmt;
use std::str::FromStr;

use crate::{Result, StuntError};

const FORMAT: &str = "%H:%M:%S";

/// Local time of day a show begins, parsed from `HH:MM:SS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StartTime {
    time: NaiveTime,
}

impl StartTime {
    pub fn new(hour: u32, minute: u32, second: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, second)
            .map(|time| Self { time })
            .ok_or_else(|| StuntError::InvalidStartTime {
                value: format!("{hour:02}:{minute:02}:{second:02}"),
            })
    }

    pub fn parse(text: &str) -> Result<Self> {
        NaiveTime::parse_from_str(text.trim(), FORMAT)
            .map(|time| Self { time: time.with_nanosecond(0).unwrap_or(time) })
            .map_err(|_| StuntError::InvalidStartTime { value: text.to_string() })
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// Milliseconds left until the start time, or 0 once it has passed
    ///
    /// `now` is read in its own offset, so pass the device-local time.
    pub fn remaining_ms(&self, now: DateTime<FixedOffset>) -> u64 {
        // Truncate to whole seconds like the HH:MM:SS clock readout
        let now = now.time();
        let now = now.with_nanosecond(0).unwrap_or(now);
        self.time.signed_duration_since(now).num_milliseconds().max(0) as u64
    }

    pub fn is_due(&self, now: DateTime<FixedOffset>) -> bool {
        self.remaining_ms(now) == 0
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format(FORMAT))
    }
}

impl FromStr for StartTime {
    type Err = StuntError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Render a countdown as `HH:MM:SS`
///
/// Hours are not wrapped, so long waits show e.g. `26:00:00`.
pub fn format_countdown(remaining_ms: u64) -> String {
    let seconds = remaining_ms / 1000;
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-01T00:00:00Z
    const MIDNIGHT: i64 = 1_704_067_200_000;

    fn at(wall_ms: i64, offset_hours: i32) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        DateTime::from_timestamp_millis(wall_ms).unwrap().with_timezone(&offset)
    }

    #[test]
    fn parses_time_of_day() {
        let start = StartTime::parse("20:30:05").unwrap();
        assert_eq!(start, StartTime::new(20, 30, 5).unwrap());
        assert_eq!(start.to_string(), "20:30:05");
        assert_eq!("7:05:00".parse::<StartTime>().unwrap().to_string(), "07:05:00");
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["", "20:30", "24:00:00", "12:60:00", "12:00:61", "12:00:00:00", "aa:bb:cc", "123:0:0"] {
            let err = StartTime::parse(bad).unwrap_err();
            assert!(err.is_input_error(), "{bad}");
        }
        assert!(StartTime::new(24, 0, 0).is_err());
    }

    #[test]
    fn counts_down_within_the_day() {
        let start = StartTime::parse("20:00:00").unwrap();
        let now = at(MIDNIGHT + 19 * 3_600_000 + 59 * 60_000 + 30_500, 0);
        assert_eq!(start.remaining_ms(now), 30_000);
        assert!(!start.is_due(now));
        assert_eq!(format_countdown(start.remaining_ms(now)), "00:00:30");
    }

    #[test]
    fn passed_start_is_due() {
        let start = StartTime::parse("08:00:00").unwrap();
        assert_eq!(start.remaining_ms(at(MIDNIGHT + 9 * 3_600_000, 0)), 0);
        assert!(start.is_due(at(MIDNIGHT + 8 * 3_600_000, 0)));
    }

    #[test]
    fn compares_against_local_time_of_day() {
        let start = StartTime::parse("20:00:00").unwrap();
        // 18:00 UTC is 20:00 at UTC+2
        let wall = MIDNIGHT + 18 * 3_600_000;
        assert_eq!(start.remaining_ms(at(wall, 2)), 0);
        assert_eq!(start.remaining_ms(at(wall, 0)), 2 * 3_600_000);
        // and 15:00 at UTC-3
        assert_eq!(start.remaining_ms(at(wall, -3)), 5 * 3_600_000);
    }

    #[test]
    fn formats_long_countdowns() {
        assert_eq!(format_countdown(0), "00:00:00");
        assert_eq!(format_countdown(3_723_999), "01:02:03");
        assert_eq!(format_countdown(26 * 3_600_000), "26:00:00");
    }
}
