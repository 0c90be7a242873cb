//! Remote shared record store
//!
//! The store holds three kinds of records:
//! - `flashSync`: the single [`SyncRecord`] every device anchors to
//! - `participants/{deviceId}`: one [`Participant`] per joined device
//! - `seatColors/{seatKey}`: optional color overrides per seat
//!
//! Listeners receive full snapshots of `flashSync`, never deltas.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use crate::{Result, StuntError};

/// The shared clock record under `flashSync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Monotonic ms every device anchors its phase to
    pub reference_timestamp: i64,
    pub frequency_hz: u32,
    pub event_id: String,
    pub active: bool,
    #[serde(default)]
    pub participant_count: u32,
}

/// A joined device under `participants/{deviceId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub device_id: String,
    pub event_id: String,
    pub timestamp: i64,
}

/// Remote key-value store with push notification on `flashSync`
///
/// Calls may fail or hang; callers bound them with a timeout and treat any
/// failure as stale data.
#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Replace the whole `flashSync` record
    async fn publish_sync(&self, record: SyncRecord) -> Result<()>;

    /// Replace only `flashSync/referenceTimestamp`
    async fn publish_reference(&self, timestamp_ms: i64) -> Result<()>;

    /// Write `participants/{deviceId}`
    async fn put_participant(&self, participant: Participant) -> Result<()>;

    /// Delete `participants/{deviceId}`; deleting a missing entry succeeds
    async fn remove_participant(&self, device_id: &str) -> Result<()>;

    /// Read `seatColors/{seatKey}`
    async fn seat_color(&self, seat_key: &str) -> Result<Option<String>>;

    /// Write `seatColors/{seatKey}`
    async fn set_seat_color(&self, seat_key: &str, color: &str) -> Result<()>;

    /// Full snapshots of `flashSync`, current value first when present
    ///
    /// An `Err` item is a snapshot that could not be read or decoded.
    fn sync_updates(&self) -> BoxStream<'static, Result<SyncRecord>>;
}

#[derive(Debug, Clone)]
enum Snapshot {
    Record(SyncRecord),
    Unreadable(String),
}

#[derive(Debug, Default)]
struct MemoryData {
    record: Option<SyncRecord>,
    participants: HashMap<String, Participant>,
    seat_colors: HashMap<String, String>,
}

/// In-process store shared by every simulated device of a venue
///
/// Clones refer to the same store. Participant counts on the sync record
/// are maintained by the store itself.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
    snapshots: Arc<watch::Sender<Option<Snapshot>>>,
    fail_writes: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            data: Arc::new(Mutex::new(MemoryData::default())),
            snapshots: Arc::new(tx),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every read and write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Push a snapshot that listeners cannot decode
    pub fn push_unreadable(&self, details: impl Into<String>) {
        self.snapshots.send_replace(Some(Snapshot::Unreadable(details.into())));
    }

    pub fn record(&self) -> Option<SyncRecord> {
        self.data.lock().record.clone()
    }

    pub fn participants(&self) -> Vec<Participant> {
        let mut list: Vec<_> = self.data.lock().participants.values().cloned().collect();
        list.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        list
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StuntError::store_failed(operation))
        } else {
            Ok(())
        }
    }

    /// Recount participants of the record's event and notify listeners
    fn notify(&self, data: &mut MemoryData) {
        if let Some(record) = data.record.as_mut() {
            record.participant_count = data
                .participants
                .values()
                .filter(|p| p.event_id == record.event_id)
                .count() as u32;
            trace!(?record, "flashSync changed");
            self.snapshots.send_replace(Some(Snapshot::Record(record.clone())));
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn publish_sync(&self, record: SyncRecord) -> Result<()> {
        self.check_available("publish flashSync")?;
        let mut data = self.data.lock();
        data.record = Some(record);
        self.notify(&mut data);
        Ok(())
    }

    async fn publish_reference(&self, timestamp_ms: i64) -> Result<()> {
        self.check_available("publish flashSync/referenceTimestamp")?;
        let mut data = self.data.lock();
        let record = data.record.get_or_insert_with(|| SyncRecord {
            reference_timestamp: timestamp_ms,
            frequency_hz: 0,
            event_id: String::new(),
            active: false,
            participant_count: 0,
        });
        record.reference_timestamp = timestamp_ms;
        self.notify(&mut data);
        Ok(())
    }

    async fn put_participant(&self, participant: Participant) -> Result<()> {
        self.check_available("write participant")?;
        let mut data = self.data.lock();
        data.participants.insert(participant.device_id.clone(), participant);
        self.notify(&mut data);
        Ok(())
    }

    async fn remove_participant(&self, device_id: &str) -> Result<()> {
        self.check_available("remove participant")?;
        let mut data = self.data.lock();
        if data.participants.remove(device_id).is_some() {
            self.notify(&mut data);
        }
        Ok(())
    }

    async fn seat_color(&self, seat_key: &str) -> Result<Option<String>> {
        self.check_available("read seat color")?;
        Ok(self.data.lock().seat_colors.get(seat_key).cloned())
    }

    async fn set_seat_color(&self, seat_key: &str, color: &str) -> Result<()> {
        self.check_available("write seat color")?;
        self.data.lock().seat_colors.insert(seat_key.to_string(), color.to_string());
        Ok(())
    }

    fn sync_updates(&self) -> BoxStream<'static, Result<SyncRecord>> {
        WatchStream::new(self.snapshots.subscribe())
            .filter_map(|snapshot| async move {
                match snapshot? {
                    Snapshot::Record(record) => Some(Ok(record)),
                    Snapshot::Unreadable(details) => Some(Err(StuntError::parse("flashSync", details))),
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(event: &str) -> SyncRecord {
        SyncRecord {
            reference_timestamp: 1_000,
            frequency_hz: 2,
            event_id: event.to_string(),
            active: true,
            participant_count: 0,
        }
    }

    fn participant(device: &str, event: &str) -> Participant {
        Participant { device_id: device.into(), event_id: event.into(), timestamp: 0 }
    }

    #[tokio::test]
    async fn listeners_get_full_snapshots_with_counts() {
        let store = MemoryStore::new();
        let mut updates = store.sync_updates();

        store.publish_sync(record("final")).await.unwrap();
        let first = updates.next().await.unwrap().unwrap();
        assert_eq!(first.participant_count, 0);

        store.put_participant(participant("a", "final")).await.unwrap();
        store.put_participant(participant("b", "final")).await.unwrap();
        store.put_participant(participant("c", "semi")).await.unwrap();
        let latest = updates.next().await.unwrap().unwrap();
        assert_eq!(latest.participant_count, 2);
        assert_eq!(latest.event_id, "final");
    }

    #[tokio::test]
    async fn reference_update_keeps_other_fields() {
        let store = MemoryStore::new();
        store.publish_sync(record("final")).await.unwrap();
        store.publish_reference(9_000).await.unwrap();

        let current = store.record().unwrap();
        assert_eq!(current.reference_timestamp, 9_000);
        assert_eq!(current.frequency_hz, 2);
    }

    #[tokio::test]
    async fn unreadable_snapshot_surfaces_as_error() {
        let store = MemoryStore::new();
        let mut updates = store.sync_updates();
        store.push_unreadable("missing referenceTimestamp");
        assert!(updates.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn removing_missing_participant_is_ok() {
        let store = MemoryStore::new();
        store.remove_participant("ghost").await.unwrap();
        assert!(store.participants().is_empty());
    }

    #[tokio::test]
    async fn failure_injection_rejects_io() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let err = store.publish_sync(record("final")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.seat_color("A_1_1").await.is_err());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let yaml = serde_yaml_ng::to_string(&record("final")).unwrap();
        assert!(yaml.contains("referenceTimestamp: 1000"));
        assert!(yaml.contains("frequencyHz: 2"));
        assert!(yaml.contains("participantCount: 0"));
    }
}
