//! Durable storage for safety usage

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::{Result, StuntError};

/// Fields the safety gate keeps across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSafety {
    /// Flash-on time accumulated since the last daily reset
    pub total_flash_time_ms: u64,
    /// Wall-clock ms of the last daily reset
    pub last_reset_time_ms: i64,
    pub photosensitive_mode: bool,
    pub safety_warning_shown: bool,
}

impl PersistedSafety {
    /// Fresh record with the reset clock starting at `now_wall_ms`
    pub fn fresh(now_wall_ms: i64) -> Self {
        Self {
            total_flash_time_ms: 0,
            last_reset_time_ms: now_wall_ms,
            photosensitive_mode: false,
            safety_warning_shown: false,
        }
    }
}

/// Local key-value store backing the safety gate
pub trait SafetyStore: Send + Sync + 'static {
    /// Stored record, or `None` on first run
    fn load(&self) -> Result<Option<PersistedSafety>>;

    fn save(&self, record: &PersistedSafety) -> Result<()>;
}

/// YAML file store
#[derive(Debug, Clone)]
pub struct YamlSafetyStore {
    path: PathBuf,
}

impl YamlSafetyStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SafetyStore for YamlSafetyStore {
    fn load(&self) -> Result<Option<PersistedSafety>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No safety state on disk yet");
                return Ok(None);
            }
            Err(e) => {
                return Err(StuntError::persistence_failed(
                    format!("read {}", self.path.display()),
                    Box::new(e),
                ));
            }
        };

        serde_yaml_ng::from_str(&text).map(Some).map_err(|e| {
            StuntError::persistence_failed(format!("decode {}", self.path.display()), Box::new(e))
        })
    }

    fn save(&self, record: &PersistedSafety) -> Result<()> {
        let text = serde_yaml_ng::to_string(record).map_err(|e| {
            StuntError::persistence_failed("encode safety state", Box::new(e))
        })?;
        std::fs::write(&self.path, text).map_err(|e| {
            StuntError::persistence_failed(format!("write {}", self.path.display()), Box::new(e))
        })
    }
}

/// In-memory store with failure injection
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemorySafetyStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    record: Option<PersistedSafety>,
    fail: bool,
    saves: usize,
}

impl MemorySafetyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a record
    pub fn with_record(record: PersistedSafety) -> Self {
        let store = Self::default();
        store.inner.lock().record = Some(record);
        store
    }

    /// Make every load and save fail
    pub fn fail(&self, fail: bool) {
        self.inner.lock().fail = fail;
    }

    pub fn record(&self) -> Option<PersistedSafety> {
        self.inner.lock().record
    }

    /// Number of successful saves
    pub fn saves(&self) -> usize {
        self.inner.lock().saves
    }
}

impl SafetyStore for MemorySafetyStore {
    fn load(&self) -> Result<Option<PersistedSafety>> {
        let state = self.inner.lock();
        if state.fail {
            return Err(StuntError::persistence_failed(
                "load safety state",
                Box::new(std::io::Error::other("storage unavailable")),
            ));
        }
        Ok(state.record)
    }

    fn save(&self, record: &PersistedSafety) -> Result<()> {
        let mut state = self.inner.lock();
        if state.fail {
            return Err(StuntError::persistence_failed(
                "save safety state",
                Box::new(std::io::Error::other("storage unavailable")),
            ));
        }
        state.record = Some(*record);
        state.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_store_round_trips_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlSafetyStore::new(dir.path().join("safety.yaml"));
        assert_eq!(store.load().unwrap(), None);

        let record = PersistedSafety {
            total_flash_time_ms: 12_000,
            last_reset_time_ms: 1_700_000_000_000,
            photosensitive_mode: true,
            safety_warning_shown: false,
        };
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));
    }

    #[test]
    fn yaml_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("safety.yaml");
        std::fs::write(&path, "total_flash_time_ms: [oops").unwrap();

        let err = YamlSafetyStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StuntError::Persistence { .. }));
    }

    #[test]
    fn memory_store_failure_injection() {
        let store = MemorySafetyStore::new();
        store.save(&PersistedSafety::fresh(0)).unwrap();
        store.fail(true);
        assert!(store.load().is_err());
        assert!(store.save(&PersistedSafety::fresh(1)).is_err());
        assert_eq!(store.saves(), 1);
        assert_eq!(store.record(), Some(PersistedSafety::fresh(0)));
    }
}
