//! Flash safety interlock
//!
//! [`SafetyGate`] tracks two timers against the active limit profile:
//!
//! - a **continuous** timer for the current flash session, enforced by a
//!   once-per-second monitor that force-stops the session when it runs past
//!   `max_continuous_duration_ms`
//! - a **cumulative** daily total, persisted after every session and reset
//!   when more than 24 hours have passed since the last reset
//!
//! Persistence failures are logged and swallowed; the gate keeps enforcing
//! its limits from memory.
//!
//! ```rust,no_run
//! use cardstunt::clock::SystemClock;
//! use cardstunt::safety::{MemorySafetyStore, SafetyGate, SafetyProfiles};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let gate = SafetyGate::load(
//!     Arc::new(MemorySafetyStore::new()),
//!     Arc::new(SystemClock::new()),
//!     SafetyProfiles::default(),
//! );
//! let _monitor = gate.spawn_monitor(|| println!("cut off"));
//! if gate.start_session() {
//!     // ... flash ...
//!     gate.stop_session();
//! }
//! # }
//! ```

mod store;

pub use store::{MemorySafetyStore, PersistedSafety, SafetyStore, YamlSafetyStore};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// Block reason reported once the daily budget is spent
pub const DAILY_LIMIT_REASON: &str = "Daily flash limit exceeded. Please wait until tomorrow.";

/// Interval between continuous-duration checks
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

const ONE_DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// One limit profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub max_frequency_hz: u32,
    pub max_continuous_duration_ms: u64,
    pub max_daily_duration_ms: u64,
}

impl SafetyLimits {
    pub const STANDARD: SafetyLimits = SafetyLimits {
        max_frequency_hz: 10,
        max_continuous_duration_ms: 300_000,
        max_daily_duration_ms: 300_000,
    };

    pub const PHOTOSENSITIVE: SafetyLimits = SafetyLimits {
        max_frequency_hz: 3,
        max_continuous_duration_ms: 30_000,
        max_daily_duration_ms: 30_000,
    };
}

/// Limit profiles selected by the photosensitive mode flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyProfiles {
    pub standard: SafetyLimits,
    pub photosensitive: SafetyLimits,
}

impl Default for SafetyProfiles {
    fn default() -> Self {
        Self { standard: SafetyLimits::STANDARD, photosensitive: SafetyLimits::PHOTOSENSITIVE }
    }
}

impl SafetyProfiles {
    pub fn for_mode(&self, photosensitive: bool) -> SafetyLimits {
        if photosensitive { self.photosensitive } else { self.standard }
    }
}

/// Snapshot of the gate, published on every change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyState {
    pub photosensitive_mode_enabled: bool,
    pub max_continuous_duration_ms: u64,
    pub max_daily_duration_ms: u64,
    pub max_frequency_hz: u32,
    pub cumulative_today_ms: u64,
    pub can_flash: bool,
    pub block_reason: Option<String>,
    pub safety_warning_shown: bool,
}

impl SafetyState {
    fn derive(profiles: &SafetyProfiles, persisted: &PersistedSafety) -> Self {
        let limits = profiles.for_mode(persisted.photosensitive_mode);
        let can_flash = persisted.total_flash_time_ms < limits.max_daily_duration_ms;
        Self {
            photosensitive_mode_enabled: persisted.photosensitive_mode,
            max_continuous_duration_ms: limits.max_continuous_duration_ms,
            max_daily_duration_ms: limits.max_daily_duration_ms,
            max_frequency_hz: limits.max_frequency_hz,
            cumulative_today_ms: persisted.total_flash_time_ms,
            can_flash,
            block_reason: (!can_flash).then(|| DAILY_LIMIT_REASON.to_string()),
            safety_warning_shown: persisted.safety_warning_shown,
        }
    }
}

struct GateInner {
    persisted: PersistedSafety,
    /// Monotonic ms the active session started at
    session_started_ms: Option<i64>,
}

struct Shared {
    profiles: SafetyProfiles,
    store: Arc<dyn SafetyStore>,
    clock: Arc<dyn Clock>,
    inner: Mutex<GateInner>,
    state_tx: watch::Sender<SafetyState>,
    elapsed_tx: watch::Sender<u64>,
}

/// Safety interlock handle
///
/// Clones refer to the same gate.
#[derive(Clone)]
pub struct SafetyGate {
    shared: Arc<Shared>,
}

impl SafetyGate {
    /// Load persisted usage, applying the daily reset if it is due
    pub fn load(
        store: Arc<dyn SafetyStore>,
        clock: Arc<dyn Clock>,
        profiles: SafetyProfiles,
    ) -> Self {
        let now = clock.wall_ms();
        let mut persisted = match store.load() {
            Ok(Some(record)) => record,
            Ok(None) => PersistedSafety::fresh(now),
            Err(e) => {
                warn!("Failed to load safety state, starting fresh: {}", e);
                PersistedSafety::fresh(now)
            }
        };

        if now - persisted.last_reset_time_ms > ONE_DAY_MS {
            info!(
                previous_total_ms = persisted.total_flash_time_ms,
                "Daily flash allowance reset"
            );
            persisted.total_flash_time_ms = 0;
            persisted.last_reset_time_ms = now;
            if let Err(e) = store.save(&persisted) {
                warn!("Failed to persist daily reset: {}", e);
            }
        }

        let state = SafetyState::derive(&profiles, &persisted);
        debug!(
            cumulative_ms = state.cumulative_today_ms,
            photosensitive = state.photosensitive_mode_enabled,
            "Safety state loaded"
        );
        let (state_tx, _) = watch::channel(state);
        let (elapsed_tx, _) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                profiles,
                store,
                clock,
                inner: Mutex::new(GateInner { persisted, session_started_ms: None }),
                state_tx,
                elapsed_tx,
            }),
        }
    }

    /// Current snapshot
    pub fn state(&self) -> SafetyState {
        self.shared.state_tx.borrow().clone()
    }

    /// Snapshots, current value first
    pub fn subscribe(&self) -> WatchStream<SafetyState> {
        WatchStream::new(self.shared.state_tx.subscribe())
    }

    /// Elapsed ms of the active session as seen by the monitor; 0 when idle
    pub fn subscribe_session_elapsed(&self) -> WatchStream<u64> {
        WatchStream::new(self.shared.elapsed_tx.subscribe())
    }

    /// Authorize a flash session
    ///
    /// Returns false, changing nothing, when the current snapshot forbids
    /// flashing. Asking again while a session is active keeps the first
    /// start time.
    pub fn start_session(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        let state = SafetyState::derive(&self.shared.profiles, &inner.persisted);
        if !state.can_flash {
            warn!(reason = ?state.block_reason, "Flash session blocked");
            return false;
        }
        if inner.session_started_ms.is_some() {
            debug!("Flash session already active");
            return true;
        }

        inner.session_started_ms = Some(self.shared.clock.monotonic_ms());
        info!("Flash session started");
        true
    }

    /// End the active session and bank its duration. No-op when idle.
    pub fn stop_session(&self) {
        let mut inner = self.shared.inner.lock();
        self.stop_locked(&mut inner);
    }

    fn stop_locked(&self, inner: &mut GateInner) {
        let Some(started) = inner.session_started_ms.take() else {
            return;
        };

        let session_ms = (self.shared.clock.monotonic_ms() - started).max(0) as u64;
        inner.persisted.total_flash_time_ms =
            inner.persisted.total_flash_time_ms.saturating_add(session_ms);
        self.persist(&inner.persisted);
        self.shared.elapsed_tx.send_replace(0);
        self.publish(&inner.persisted);

        info!(
            session_ms,
            total_today_ms = inner.persisted.total_flash_time_ms,
            "Flash session stopped"
        );
    }

    /// One monitor tick: force-stop a session past the continuous limit
    ///
    /// Returns true when this call cut the session off.
    pub fn check_continuous_limit(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(started) = inner.session_started_ms else {
            return false;
        };

        let elapsed = (self.shared.clock.monotonic_ms() - started).max(0) as u64;
        let limits = self.shared.profiles.for_mode(inner.persisted.photosensitive_mode);
        if elapsed > limits.max_continuous_duration_ms {
            warn!(
                elapsed_ms = elapsed,
                limit_ms = limits.max_continuous_duration_ms,
                "Continuous flash duration exceeded safe limit"
            );
            self.stop_locked(&mut inner);
            return true;
        }

        self.shared.elapsed_tx.send_replace(elapsed);
        false
    }

    /// Run [`check_continuous_limit`](Self::check_continuous_limit) every second
    ///
    /// `on_cutoff` runs after each forced stop; it is where the caller
    /// stops its scheduler and darkens its actuator. The monitor ends when
    /// the returned handle is dropped.
    pub fn spawn_monitor<F>(&self, on_cutoff: F) -> SafetyMonitor
    where
        F: Fn() + Send + Sync + 'static,
    {
        let gate = self.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(CHECK_INTERVAL);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Safety monitor started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                if gate.check_continuous_limit() {
                    on_cutoff();
                }
            }

            debug!("Safety monitor stopped");
        });

        SafetyMonitor { cancel }
    }

    /// Switch between the standard and photosensitive profiles
    pub fn set_photosensitive_mode(&self, enabled: bool) {
        let mut inner = self.shared.inner.lock();
        inner.persisted.photosensitive_mode = enabled;
        self.persist(&inner.persisted);
        self.publish(&inner.persisted);
        info!("Photosensitive mode {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn mark_warning_shown(&self) {
        let mut inner = self.shared.inner.lock();
        inner.persisted.safety_warning_shown = true;
        self.persist(&inner.persisted);
        self.publish(&inner.persisted);
    }

    /// Clear the daily total now
    pub fn reset_daily_limit(&self) {
        let mut inner = self.shared.inner.lock();
        inner.persisted.total_flash_time_ms = 0;
        inner.persisted.last_reset_time_ms = self.shared.clock.wall_ms();
        self.persist(&inner.persisted);
        self.publish(&inner.persisted);
        info!("Daily flash allowance reset on request");
    }

    pub fn is_frequency_safe(&self, frequency: u32) -> bool {
        frequency <= self.limits().max_frequency_hz
    }

    /// Limits of the active profile
    pub fn limits(&self) -> SafetyLimits {
        let inner = self.shared.inner.lock();
        self.shared.profiles.for_mode(inner.persisted.photosensitive_mode)
    }

    /// Daily budget left
    pub fn remaining_ms(&self) -> u64 {
        let inner = self.shared.inner.lock();
        let limits = self.shared.profiles.for_mode(inner.persisted.photosensitive_mode);
        limits.max_daily_duration_ms.saturating_sub(inner.persisted.total_flash_time_ms)
    }

    pub fn cumulative_today_ms(&self) -> u64 {
        self.shared.inner.lock().persisted.total_flash_time_ms
    }

    pub fn is_session_active(&self) -> bool {
        self.shared.inner.lock().session_started_ms.is_some()
    }

    fn persist(&self, record: &PersistedSafety) {
        if let Err(e) = self.shared.store.save(record) {
            warn!("Failed to persist safety state: {}", e);
        }
    }

    fn publish(&self, record: &PersistedSafety) {
        self.shared.state_tx.send_replace(SafetyState::derive(&self.shared.profiles, record));
    }
}

/// Handle to a running safety monitor; dropping it stops the monitor
pub struct SafetyMonitor {
    cancel: CancellationToken,
}

impl SafetyMonitor {
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SafetyMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
