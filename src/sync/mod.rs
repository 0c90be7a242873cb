//! Shared clock synchronization
//!
//! [`ClockSync`] publishes and follows the venue-wide [`SyncRecord`]. A
//! listener task, spawned at construction, watches the store and turns every
//! snapshot into a [`SyncState`]:
//!
//! - a readable snapshot yields `connected = true`, `synced = record.active`
//!   and `latency = local monotonic now - reference timestamp`
//! - an unreadable snapshot yields `connected = false, synced = false`
//!
//! All writes are bounded by a timeout and never fail toward the caller;
//! failures are logged and the state simply goes stale.

mod store;

pub use store::{MemoryStore, Participant, SharedStore, SyncRecord};

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::{Result, StuntError};

/// Default bound on every remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection and synchronization status derived from the last snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncState {
    pub connected: bool,
    pub synced: bool,
    pub latency_ms: i64,
}

impl SyncState {
    pub const DISCONNECTED: SyncState = SyncState { connected: false, synced: false, latency_ms: 0 };
}

/// Device-side view of the shared clock
pub struct ClockSync {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    device_id: String,
    timeout: Duration,
    /// Event this device is registered under, if any
    joined: Mutex<Option<String>>,
    states: watch::Receiver<SyncState>,
    records: watch::Receiver<Option<SyncRecord>>,
    cancel: CancellationToken,
}

impl ClockSync {
    /// Start listening to the store's sync record
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        device_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let device_id = device_id.into();
        let (state_tx, states) = watch::channel(SyncState::DISCONNECTED);
        let (record_tx, records) = watch::channel(None);
        let cancel = CancellationToken::new();

        let updates = store.sync_updates();
        let listener_clock = Arc::clone(&clock);
        let token = cancel.clone();
        tokio::spawn(async move {
            Self::listener_task(updates, listener_clock, state_tx, record_tx, token).await;
        });

        info!(device = %device_id, "Clock sync listening");
        Self {
            store,
            clock,
            device_id,
            timeout,
            joined: Mutex::new(None),
            states,
            records,
            cancel,
        }
    }

    async fn listener_task(
        mut updates: futures::stream::BoxStream<'static, Result<SyncRecord>>,
        clock: Arc<dyn Clock>,
        state_tx: watch::Sender<SyncState>,
        record_tx: watch::Sender<Option<SyncRecord>>,
        cancel: CancellationToken,
    ) {
        let mut update_count = 0u64;

        loop {
            let update = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sync listener cancelled");
                    break;
                }
                update = updates.next() => update,
            };

            match update {
                Some(Ok(record)) => {
                    update_count += 1;
                    let latency_ms = clock.monotonic_ms() - record.reference_timestamp;
                    let state = SyncState { connected: true, synced: record.active, latency_ms };
                    debug!(
                        reference = record.reference_timestamp,
                        frequency = record.frequency_hz,
                        participants = record.participant_count,
                        latency_ms,
                        "Sync updated"
                    );
                    record_tx.send_replace(Some(record));
                    state_tx.send_replace(state);
                }
                Some(Err(e)) => {
                    warn!("Error processing sync data: {}", e);
                    state_tx.send_replace(SyncState::DISCONNECTED);
                }
                None => {
                    warn!("Sync listener stream ended");
                    state_tx.send_replace(SyncState::DISCONNECTED);
                    break;
                }
            }
        }

        trace!(update_count, "Sync listener ended");
    }

    /// Publish a fresh active record anchored at local now and join it
    pub async fn start_sync(&self, event_id: &str, frequency_hz: u32) {
        let now = self.clock.monotonic_ms();
        let record = SyncRecord {
            reference_timestamp: now,
            frequency_hz,
            event_id: event_id.to_string(),
            active: true,
            participant_count: 0,
        };

        match self.bounded("publish flashSync", self.store.publish_sync(record)).await {
            Ok(()) => info!(event = event_id, frequency_hz, "Sync started"),
            Err(e) => warn!("Error starting sync: {}", e),
        }
        self.join(event_id).await;
    }

    /// Publish an inactive record and leave
    pub async fn stop_sync(&self) {
        let record = SyncRecord {
            reference_timestamp: self.clock.monotonic_ms(),
            frequency_hz: 0,
            event_id: String::new(),
            active: false,
            participant_count: 0,
        };

        match self.bounded("publish flashSync", self.store.publish_sync(record)).await {
            Ok(()) => info!("Sync stopped"),
            Err(e) => warn!("Error stopping sync: {}", e),
        }
        // Remove by device id even when the earlier join was never confirmed
        let joined = self.joined.lock().take();
        self.deregister(joined).await;
    }

    /// Republish the reference timestamp to re-anchor drifted devices
    pub async fn update_timestamp(&self) {
        let now = self.clock.monotonic_ms();
        match self.bounded("publish referenceTimestamp", self.store.publish_reference(now)).await {
            Ok(()) => debug!(timestamp = now, "Reference timestamp updated"),
            Err(e) => warn!("Error updating timestamp: {}", e),
        }
    }

    /// Register this device under `event_id`; repeating it is harmless
    pub async fn join(&self, event_id: &str) {
        let participant = Participant {
            device_id: self.device_id.clone(),
            event_id: event_id.to_string(),
            timestamp: self.clock.monotonic_ms(),
        };

        match self.bounded("write participant", self.store.put_participant(participant)).await {
            Ok(()) => {
                *self.joined.lock() = Some(event_id.to_string());
                debug!(event = event_id, "Joined sync");
            }
            Err(e) => warn!("Error joining sync: {}", e),
        }
    }

    /// Deregister this device. No-op when not registered.
    ///
    /// A failed removal keeps the registration so a later call retries it.
    pub async fn leave(&self) {
        let Some(event_id) = self.joined.lock().take() else {
            debug!("Not registered, nothing to leave");
            return;
        };
        self.deregister(Some(event_id)).await;
    }

    async fn deregister(&self, event_id: Option<String>) {
        let result =
            self.bounded("remove participant", self.store.remove_participant(&self.device_id)).await;
        match result {
            Ok(()) => debug!(event = ?event_id, "Left sync"),
            Err(e) => {
                warn!("Error leaving sync: {}", e);
                if let Some(event_id) = event_id {
                    self.joined.lock().get_or_insert(event_id);
                }
            }
        }
    }

    /// Read a seat color override, treating failures as "no override"
    pub async fn seat_color(&self, seat_key: &str) -> Option<String> {
        match self.bounded("read seat color", self.store.seat_color(seat_key)).await {
            Ok(color) => color,
            Err(e) => {
                warn!(seat = seat_key, "Error reading seat color: {}", e);
                None
            }
        }
    }

    /// Write a seat color override, fire-and-forget
    pub async fn set_seat_color(&self, seat_key: &str, color: &str) {
        if let Err(e) =
            self.bounded("write seat color", self.store.set_seat_color(seat_key, color)).await
        {
            warn!(seat = seat_key, "Error writing seat color: {}", e);
        }
    }

    pub fn sync_state(&self) -> SyncState {
        *self.states.borrow()
    }

    /// Last readable record, if any
    pub fn current_record(&self) -> Option<SyncRecord> {
        self.records.borrow().clone()
    }

    /// Sync states, current value first
    pub fn subscribe_state(&self) -> impl Stream<Item = SyncState> + 'static {
        WatchStream::new(self.states.clone())
    }

    /// Readable records, current value first when present
    pub fn subscribe_records(&self) -> impl Stream<Item = SyncRecord> + 'static {
        WatchStream::new(self.records.clone()).filter_map(|record| async move { record })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_joined(&self) -> bool {
        self.joined.lock().is_some()
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                Err(StuntError::Timeout { operation: operation.to_string(), duration: self.timeout })
            }
        }
    }
}

impl Drop for ClockSync {
    fn drop(&mut self) {
        debug!(device = %self.device_id, "Dropping clock sync");
        self.cancel.cancel();
    }
}
