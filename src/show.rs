//! Per-device flash show
//!
//! [`FlashShow`] wires the components of one seat together:
//!
//! ```text
//! Seat -> PatternCalculator -> SafetyGate authorizes
//!      -> ClockSync reference -> PhaseScheduler -> Actuator
//! ```
//!
//! Construction spawns two background tasks: the safety monitor, which
//! force-stops the scheduler and darkens the actuator when the continuous
//! limit is exceeded, and a re-anchor task that feeds every active sync
//! record's reference timestamp to the scheduler.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actuator::Actuator;
use crate::calculator::PatternCalculator;
use crate::clock::Clock;
use crate::config::ShowConfig;
use crate::safety::{DAILY_LIMIT_REASON, SafetyGate, SafetyMonitor, SafetyState, SafetyStore};
use crate::scheduler::{PhaseScheduler, StartTime, format_countdown};
use crate::sync::{ClockSync, SharedStore, SyncRecord, SyncState};
use crate::types::{Color, FlashPattern, FlashTiming, Phase, Seat};
use crate::{Result, StuntError};

/// Block reason when flashing is switched off in the configuration
pub const FLASH_DISABLED_REASON: &str = "Flash is disabled for this event";

/// Result of asking the show to start flashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Refused; `reason` is meant for the user
    Blocked { reason: String },
    /// No usable flash hardware on this device
    Unavailable,
}

/// External collaborators of a show
pub struct ShowParts {
    pub actuator: Arc<dyn Actuator>,
    pub safety_store: Arc<dyn SafetyStore>,
    pub shared_store: Arc<dyn SharedStore>,
    pub clock: Arc<dyn Clock>,
    pub device_id: String,
}

pub struct FlashShow {
    config: ShowConfig,
    seat: Seat,
    calculator: PatternCalculator,
    frequency: Mutex<u32>,
    clock: Arc<dyn Clock>,
    safety: SafetyGate,
    sync: ClockSync,
    scheduler: Arc<PhaseScheduler>,
    actuator: Arc<dyn Actuator>,
    /// Serializes start, restart, stop and the safety cutoff
    control: Arc<Mutex<()>>,
    _monitor: SafetyMonitor,
    cancel: CancellationToken,
}

impl FlashShow {
    /// Assemble a show for `seat`
    ///
    /// Fails only on an invalid configuration. Must be called within a
    /// tokio runtime.
    pub fn new(config: ShowConfig, seat: Seat, parts: ShowParts) -> Result<Self> {
        config.validate()?;
        let calculator = PatternCalculator::new(config.flash_duty_cycle, config.palette())?;

        let clock = parts.clock;
        let safety = SafetyGate::load(parts.safety_store, Arc::clone(&clock), config.safety);
        let sync = ClockSync::spawn(
            parts.shared_store,
            Arc::clone(&clock),
            parts.device_id,
            config.remote_timeout(),
        );
        let scheduler = Arc::new(PhaseScheduler::new(Arc::clone(&clock)));
        let actuator = parts.actuator;
        let control = Arc::new(Mutex::new(()));

        let monitor = {
            let scheduler = Arc::clone(&scheduler);
            let actuator = Arc::clone(&actuator);
            let control = Arc::clone(&control);
            safety.spawn_monitor(move || {
                let _control = control.lock();
                scheduler.stop();
                actuator.turn_off();
                warn!("Flash stopped by safety limit");
            })
        };

        let cancel = CancellationToken::new();
        tokio::spawn(Self::reanchor_task(
            sync.subscribe_records(),
            Arc::clone(&scheduler),
            cancel.clone(),
        ));

        info!(seat = %seat, even = seat.is_even(), "Flash show ready");
        Ok(Self {
            frequency: Mutex::new(config.default_flash_frequency),
            config,
            seat,
            calculator,
            clock,
            safety,
            sync,
            scheduler,
            actuator,
            control,
            _monitor: monitor,
            cancel,
        })
    }

    async fn reanchor_task(
        records: impl Stream<Item = SyncRecord> + Send + 'static,
        scheduler: Arc<PhaseScheduler>,
        cancel: CancellationToken,
    ) {
        let mut records = std::pin::pin!(records);
        loop {
            let record = tokio::select! {
                _ = cancel.cancelled() => break,
                record = records.next() => record,
            };
            match record {
                Some(record) if record.active => scheduler.synchronize(record.reference_timestamp),
                Some(_) => debug!("Ignoring inactive sync record"),
                None => break,
            }
        }
        debug!("Re-anchor task ended");
    }

    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    pub fn frequency(&self) -> u32 {
        *self.frequency.lock()
    }

    /// Pattern for this seat at the current frequency
    pub fn pattern(&self) -> FlashPattern {
        self.calculator.calculate_for_seat(&self.seat, self.frequency())
    }

    /// Change the flash frequency
    ///
    /// A running show restarts its loop at the new frequency, keeping its
    /// safety session. A loop whose session has already been cut off is
    /// halted instead of restarted.
    pub fn set_frequency(&self, frequency: u32) -> Result<FlashPattern> {
        PatternCalculator::validate_frequency(frequency)?;
        if frequency > self.config.max_flash_frequency {
            return Err(StuntError::InvalidFrequency { value: frequency });
        }

        let _control = self.control.lock();
        *self.frequency.lock() = frequency;
        if self.scheduler.is_running() {
            if self.config.flash_safety_enabled && !self.safety.is_frequency_safe(frequency) {
                warn!(frequency, "Frequency above the safe limit, stopping flash");
                self.halt();
            } else if !self.safety.is_session_active() {
                warn!(frequency, "Safety session ended, not restarting flash");
                self.halt();
            } else {
                self.run_scheduler(frequency);
            }
        }
        Ok(self.pattern())
    }

    /// Start flashing, if the device and safety limits allow it
    pub fn start(&self) -> StartOutcome {
        if !self.config.flash_enabled {
            return StartOutcome::Blocked { reason: FLASH_DISABLED_REASON.to_string() };
        }
        if !self.actuator.is_available() {
            warn!("Cannot start flash: no flash hardware");
            return StartOutcome::Unavailable;
        }

        let _control = self.control.lock();
        let frequency = self.frequency();
        if self.config.flash_safety_enabled && !self.safety.is_frequency_safe(frequency) {
            let max = self.safety.limits().max_frequency_hz;
            return StartOutcome::Blocked {
                reason: format!("Frequency {frequency}Hz exceeds the safe limit of {max}Hz"),
            };
        }
        if !self.safety.start_session() {
            let reason =
                self.safety.state().block_reason.unwrap_or_else(|| DAILY_LIMIT_REASON.to_string());
            return StartOutcome::Blocked { reason };
        }

        self.run_scheduler(frequency);
        StartOutcome::Started
    }

    /// Wait for `start_time`, then [`start`](Self::start)
    pub async fn start_at(&self, start_time: StartTime) -> StartOutcome {
        loop {
            let remaining = start_time.remaining_ms(self.clock.local_now());
            if remaining == 0 {
                break;
            }
            debug!(countdown = %format_countdown(remaining), "Waiting for show start");
            tokio::time::sleep(Duration::from_millis(remaining.min(1_000))).await;
        }
        info!(start = %start_time, "Show start time reached");
        self.start()
    }

    fn run_scheduler(&self, frequency: u32) {
        let duty_cycle = self.calculator.duty_cycle();
        let timing = match self.anchor_reference() {
            Some(reference) => FlashTiming::new(frequency, duty_cycle, reference),
            None => {
                warn!("Not synced, flashing on local clock only");
                FlashTiming::local(frequency, duty_cycle)
            }
        };
        let actuator = Arc::clone(&self.actuator);
        self.scheduler.start(timing, self.seat.is_even(), move |lit| {
            if lit { actuator.turn_on() } else { actuator.turn_off() }
        });
    }

    /// Shared reference when synced, else the last one received
    fn anchor_reference(&self) -> Option<i64> {
        if self.sync.sync_state().synced {
            if let Some(record) = self.sync.current_record() {
                return Some(record.reference_timestamp);
            }
        }

        let last = self.scheduler.reference_timestamp();
        if let Some(reference) = last {
            warn!(reference, "Not synced, using last known reference");
        }
        last
    }

    /// Stop flashing and bank the session. Idempotent.
    pub fn stop(&self) {
        let _control = self.control.lock();
        self.halt();
    }

    fn halt(&self) {
        self.scheduler.stop();
        self.actuator.turn_off();
        self.safety.stop_session();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Last active reference received from the shared store
    pub fn synchronized_reference(&self) -> Option<i64> {
        self.scheduler.reference_timestamp()
    }

    /// Screen color for this seat, remote override first
    pub async fn seat_color(&self) -> Color {
        let key = self.seat.key();
        let remote = self.sync.seat_color(&key).await;
        self.calculator.color_for_seat(&self.seat, remote.as_deref())
    }

    /// Publish a color override for this seat
    ///
    /// Rejects malformed colors; the remote write itself is best-effort.
    pub async fn set_seat_color(&self, color: &str) -> Result<Color> {
        let parsed = Color::parse(color)?;
        self.sync.set_seat_color(&self.seat.key(), &parsed.to_string()).await;
        Ok(parsed)
    }

    pub fn safety(&self) -> &SafetyGate {
        &self.safety
    }

    pub fn sync(&self) -> &ClockSync {
        &self.sync
    }

    pub fn current_phase(&self) -> Phase {
        self.scheduler.current_phase()
    }

    pub fn subscribe_phases(&self) -> WatchStream<Phase> {
        self.scheduler.subscribe()
    }

    pub fn subscribe_safety(&self) -> WatchStream<SafetyState> {
        self.safety.subscribe()
    }

    pub fn subscribe_sync(&self) -> impl Stream<Item = SyncState> + 'static {
        self.sync.subscribe_state()
    }

    pub fn subscribe_flash(&self) -> WatchStream<bool> {
        self.actuator.subscribe()
    }
}

impl Drop for FlashShow {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.stop();
    }
}
