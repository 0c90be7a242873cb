//! Flash output abstraction
//!
//! [`Actuator`] is what the scheduler drives. [`TorchActuator`] implements it
//! over a [`FlashHardware`] service: it probes the hardware once for the
//! first unit with a flash, and turns every hardware error into
//! "unavailable" rather than propagating it.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use crate::Result;

/// Physical flash or color output
pub trait Actuator: Send + Sync + 'static {
    /// Light the output. No-op when already lit or unavailable.
    fn turn_on(&self);

    /// Darken the output. No-op when already dark or unavailable.
    fn turn_off(&self);

    /// Whether a usable output was found
    fn is_available(&self) -> bool;

    /// Whether the output is currently lit
    fn is_on(&self) -> bool;

    /// Lit/dark state, current value first
    fn subscribe(&self) -> WatchStream<bool>;
}

/// Hardware service surface: enumerate units, query capability, set state
pub trait FlashHardware: Send + Sync + 'static {
    fn unit_ids(&self) -> Result<Vec<String>>;

    fn has_flash(&self, unit_id: &str) -> Result<bool>;

    fn set_torch(&self, unit_id: &str, enabled: bool) -> Result<()>;
}

/// Actuator over a torch-capable hardware unit
pub struct TorchActuator<H: FlashHardware> {
    hardware: H,
    unit: Mutex<Option<String>>,
    lit: AtomicBool,
    state_tx: watch::Sender<bool>,
}

impl<H: FlashHardware> TorchActuator<H> {
    /// Probe the hardware and select the first unit advertising a flash
    ///
    /// Finding no unit, or failing to enumerate, yields an unavailable
    /// actuator rather than an error.
    pub fn probe(hardware: H) -> Self {
        let unit = match Self::find_flash_unit(&hardware) {
            Ok(Some(id)) => {
                info!(unit = %id, "Flash available");
                Some(id)
            }
            Ok(None) => {
                warn!("No flash available on device");
                None
            }
            Err(e) => {
                error!("Flash hardware probe failed: {}", e);
                None
            }
        };

        let (state_tx, _) = watch::channel(false);
        Self { hardware, unit: Mutex::new(unit), lit: AtomicBool::new(false), state_tx }
    }

    fn find_flash_unit(hardware: &H) -> Result<Option<String>> {
        for id in hardware.unit_ids()? {
            if hardware.has_flash(&id)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    fn set(&self, enabled: bool) {
        let mut unit = self.unit.lock();
        let Some(id) = unit.as_deref() else {
            return;
        };
        if self.lit.load(Ordering::SeqCst) == enabled {
            return;
        }

        match self.hardware.set_torch(id, enabled) {
            Ok(()) => {
                self.lit.store(enabled, Ordering::SeqCst);
                self.state_tx.send_replace(enabled);
                debug!("Flash turned {}", if enabled { "ON" } else { "OFF" });
            }
            Err(e) => {
                error!(unit = %id, "Flash hardware error, disabling output: {}", e);
                *unit = None;
                self.lit.store(false, Ordering::SeqCst);
                self.state_tx.send_replace(false);
            }
        }
    }
}

impl<H: FlashHardware> Actuator for TorchActuator<H> {
    fn turn_on(&self) {
        self.set(true);
    }

    fn turn_off(&self) {
        self.set(false);
    }

    fn is_available(&self) -> bool {
        self.unit.lock().is_some()
    }

    fn is_on(&self) -> bool {
        self.lit.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> WatchStream<bool> {
        WatchStream::new(self.state_tx.subscribe())
    }
}

impl<A: Actuator + ?Sized> Actuator for Arc<A> {
    fn turn_on(&self) {
        (**self).turn_on();
    }

    fn turn_off(&self) {
        (**self).turn_off();
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn is_on(&self) -> bool {
        (**self).is_on()
    }

    fn subscribe(&self) -> WatchStream<bool> {
        (**self).subscribe()
    }
}

/// In-process torch hardware that records every state change
///
/// Used by the venue simulation and tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTorch {
    inner: Arc<Mutex<SimulatedTorchState>>,
}

#[derive(Debug, Default)]
struct SimulatedTorchState {
    units: Vec<(String, bool)>,
    writes: Vec<bool>,
    fail_writes: bool,
    fail_enumeration: bool,
}

impl SimulatedTorch {
    /// A device with a front camera (no flash) and a rear camera with flash
    pub fn with_rear_flash() -> Self {
        Self::with_units(vec![("front".to_string(), false), ("rear".to_string(), true)])
    }

    /// A device whose cameras have no flash
    pub fn without_flash() -> Self {
        Self::with_units(vec![("front".to_string(), false)])
    }

    pub fn with_units(units: Vec<(String, bool)>) -> Self {
        let state = SimulatedTorchState { units, ..Default::default() };
        Self { inner: Arc::new(Mutex::new(state)) }
    }

    /// Make subsequent `set_torch` calls fail
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Make unit enumeration fail
    pub fn fail_enumeration(&self, fail: bool) {
        self.inner.lock().fail_enumeration = fail;
    }

    /// Every successful torch write, in order
    pub fn writes(&self) -> Vec<bool> {
        self.inner.lock().writes.clone()
    }

    pub fn last_write(&self) -> Option<bool> {
        self.inner.lock().writes.last().copied()
    }
}

impl FlashHardware for SimulatedTorch {
    fn unit_ids(&self) -> Result<Vec<String>> {
        let state = self.inner.lock();
        if state.fail_enumeration {
            return Err(crate::StuntError::hardware("enumerate units", "camera service unavailable"));
        }
        Ok(state.units.iter().map(|(id, _)| id.clone()).collect())
    }

    fn has_flash(&self, unit_id: &str) -> Result<bool> {
        let state = self.inner.lock();
        Ok(state.units.iter().any(|(id, flash)| id == unit_id && *flash))
    }

    fn set_torch(&self, unit_id: &str, enabled: bool) -> Result<()> {
        let mut state = self.inner.lock();
        if state.fail_writes {
            return Err(crate::StuntError::hardware(
                format!("set torch on {}", unit_id),
                "camera in use",
            ));
        }
        state.writes.push(enabled);
        Ok(())
    }
}
