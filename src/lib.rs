//! Synchronized card-stunt flash engine.
//!
//! Every attendee device is assigned a seat. Even and odd seats light in
//! alternating halves of a shared oscillator cycle, phase-locked to a
//! reference timestamp published through a shared store, so that the crowd
//! as a whole blinks in a coordinated pattern.
//!
//! # Components
//!
//! - [`calculator`]: seat parity to flash pattern and color
//! - [`safety`]: continuous and daily flash limits, photosensitive mode
//! - [`sync`]: shared reference timestamp and participant registry
//! - [`scheduler`]: the phase-locked on/off loop
//! - [`actuator`]: torch hardware behind an availability check
//! - [`show`]: one device's show, wiring all of the above
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cardstunt::actuator::{SimulatedTorch, TorchActuator};
//! use cardstunt::clock::SystemClock;
//! use cardstunt::safety::MemorySafetyStore;
//! use cardstunt::sync::MemoryStore;
//! use cardstunt::{FlashShow, Seat, ShowConfig, ShowParts, StartOutcome};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let parts = ShowParts {
//!         actuator: Arc::new(TorchActuator::probe(SimulatedTorch::with_rear_flash())),
//!         safety_store: Arc::new(MemorySafetyStore::new()),
//!         shared_store: Arc::new(MemoryStore::new()),
//!         clock: Arc::new(SystemClock::new()),
//!         device_id: "device-1".into(),
//!     };
//!     let show = FlashShow::new(ShowConfig::default(), Seat::parse("A-5-12")?, parts)?;
//!
//!     show.sync().start_sync("final", show.frequency()).await;
//!     if show.start() == StartOutcome::Started {
//!         tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!         show.stop();
//!     }
//!     Ok(())
//! }
//! ```

pub mod actuator;
pub mod calculator;
pub mod clock;
pub mod config;
mod error;
pub mod identity;
pub mod safety;
pub mod scheduler;
pub mod show;
pub mod sync;
pub mod types;

pub use error::*;
pub use types::*;

pub use calculator::PatternCalculator;
pub use config::ShowConfig;
pub use safety::{SafetyGate, SafetyState};
pub use scheduler::{PhaseScheduler, StartTime};
pub use show::{FlashShow, ShowParts, StartOutcome};
pub use sync::{ClockSync, SyncRecord, SyncState};
