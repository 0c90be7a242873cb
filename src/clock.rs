//! Time sources
//!
//! The engine needs two clocks: a monotonic millisecond counter that all
//! devices of a venue anchor their phase to, and a wall clock for the daily
//! safety reset and the scheduled start time. Start times are read in the
//! device's local offset.

use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Source of monotonic and wall-clock milliseconds
pub trait Clock: Send + Sync + 'static {
    /// Monotonic milliseconds since the clock origin
    fn monotonic_ms(&self) -> i64;

    /// Wall-clock milliseconds since the Unix epoch
    fn wall_ms(&self) -> i64;

    /// Offset of the device's local time from UTC
    fn local_offset(&self) -> FixedOffset {
        Utc.fix()
    }

    /// Wall clock reading in local time
    fn local_now(&self) -> DateTime<FixedOffset> {
        DateTime::from_timestamp_millis(self.wall_ms())
            .unwrap_or_default()
            .with_timezone(&self.local_offset())
    }
}

/// Clock backed by the tokio timer and the system time
///
/// Clones share the same origin, so every component built from clones of
/// one `SystemClock` reports the same monotonic timeline. Under a paused
/// tokio runtime the monotonic reading follows virtual time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    /// Create a clock whose monotonic origin is now
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }

    fn wall_ms(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
    }

    fn local_offset(&self) -> FixedOffset {
        *Local::now().offset()
    }
}

/// Manually driven clock for simulations and tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    monotonic: Arc<AtomicI64>,
    wall: Arc<AtomicI64>,
    offset_secs: Arc<AtomicI32>,
}

impl ManualClock {
    /// Create a clock at the given monotonic and wall readings
    pub fn new(monotonic_ms: i64, wall_ms: i64) -> Self {
        Self {
            monotonic: Arc::new(AtomicI64::new(monotonic_ms)),
            wall: Arc::new(AtomicI64::new(wall_ms)),
            offset_secs: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Move both readings forward
    pub fn advance(&self, ms: i64) {
        self.monotonic.fetch_add(ms, Ordering::SeqCst);
        self.wall.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set the monotonic reading
    pub fn set_monotonic(&self, ms: i64) {
        self.monotonic.store(ms, Ordering::SeqCst);
    }

    /// Set the wall reading
    pub fn set_wall(&self, ms: i64) {
        self.wall.store(ms, Ordering::SeqCst);
    }

    /// Place the clock in a timezone `seconds` east of UTC
    pub fn set_utc_offset(&self, seconds: i32) {
        self.offset_secs.store(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> i64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn wall_ms(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }

    fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_secs.load(Ordering::SeqCst)).unwrap_or(Utc.fix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn manual_clock_advances_both_readings() {
        let clock = ManualClock::new(100, 5_000);
        clock.advance(250);
        assert_eq!(clock.monotonic_ms(), 350);
        assert_eq!(clock.wall_ms(), 5_250);

        let shared = clock.clone();
        shared.set_monotonic(0);
        assert_eq!(clock.monotonic_ms(), 0);
    }

    #[test]
    fn manual_clock_reports_local_time() {
        // 2024-01-01T18:00:00Z
        let clock = ManualClock::new(0, 1_704_132_000_000);
        assert_eq!(clock.local_now().format("%H:%M:%S").to_string(), "18:00:00");

        clock.set_utc_offset(2 * 3600);
        assert_eq!(clock.local_now().format("%H:%M:%S").to_string(), "20:00:00");
        assert_eq!(clock.local_now().timestamp_millis(), clock.wall_ms());
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_follows_virtual_time() {
        let clock = SystemClock::new();
        let copy = clock.clone();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(clock.monotonic_ms(), 1_500);
        assert_eq!(copy.monotonic_ms(), clock.monotonic_ms());
        assert!(clock.wall_ms() > 0);
    }
}
