// src/store/context.rs

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use crate::store::lock::{LockMode, LockOptions, ScopedLock};
use crate::store::model::{Artifact, Event, Snapshot};
use crate::store::persist::{self, StorePaths};

/// Event kind recorded when `load` replaced a corrupt snapshot.
pub const RECOVERED_EVENT: &str = "store_recovered";

/// Where and how a durable store keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub dir: PathBuf,
    pub lock: LockOptions,
    /// Temp files older than this are deleted on load.
    pub stale_temp_age: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".rundag"),
            lock: LockOptions::default(),
            stale_temp_age: Duration::from_secs(600),
        }
    }
}

impl StoreOptions {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Shared, versioned key/value + event + artifact store.
///
/// Every mutation takes the in-process mutex and bumps `version` by one.
/// `save`/`load` additionally take a cross-process file lock: exclusive for
/// writes, shared for reads.
#[derive(Debug)]
pub struct ContextStore {
    id: String,
    paths: Option<StorePaths>,
    lock_options: LockOptions,
    state: Mutex<Snapshot>,
}

impl ContextStore {
    /// A store that never touches disk; `save` fails with
    /// [`StoreError::NoStorage`].
    pub fn in_memory(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            paths: None,
            lock_options: LockOptions::default(),
            state: Mutex::new(Snapshot::default()),
        }
    }

    /// Reconstruct the store `id` from disk, or start empty if there is no
    /// snapshot yet.
    ///
    /// A snapshot that fails to parse is renamed aside with a `.corrupt-<ts>`
    /// suffix and an empty state (carrying a [`RECOVERED_EVENT`]) is returned
    /// instead of an error. Lock timeouts and IO failures are still surfaced.
    pub async fn load(id: &str, options: StoreOptions) -> Result<Self, StoreError> {
        let paths = StorePaths::new(&options.dir, id)?;
        std::fs::create_dir_all(&paths.dir)?;
        persist::remove_stale_temps(&paths, options.stale_temp_age);

        let first_read = {
            let _guard = ScopedLock::acquire(&paths.lock, LockMode::Shared, options.lock).await?;
            persist::read_snapshot(&paths.data)
        };

        let snapshot = match first_read {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(store = %id, "no snapshot on disk; starting empty");
                Snapshot::default()
            }
            Err(StoreError::Corrupt { .. }) => Self::recover(&paths, options.lock).await?,
            Err(e) => return Err(e),
        };

        info!(store = %id, version = snapshot.version, path = ?paths.data, "context store loaded");
        Ok(Self {
            id: id.to_string(),
            paths: Some(paths),
            lock_options: options.lock,
            state: Mutex::new(snapshot),
        })
    }

    /// Alias for [`load`](Self::load).
    pub async fn open(id: &str, options: StoreOptions) -> Result<Self, StoreError> {
        Self::load(id, options).await
    }

    /// Re-check under the exclusive lock (another process may have rewritten
    /// the file meanwhile), then quarantine.
    async fn recover(paths: &StorePaths, lock: LockOptions) -> Result<Snapshot, StoreError> {
        let _guard = ScopedLock::acquire(&paths.lock, LockMode::Exclusive, lock).await?;

        match persist::read_snapshot(&paths.data) {
            Ok(Some(snapshot)) => Ok(snapshot),
            Ok(None) => Ok(Snapshot::default()),
            Err(StoreError::Corrupt { reason, .. }) => {
                let backup = persist::quarantine(&paths.data)?;
                warn!(path = ?paths.data, %reason, "snapshot corrupt; starting from empty state");

                let mut fresh = Snapshot::default();
                fresh.events.push(Event {
                    kind: RECOVERED_EVENT.to_string(),
                    payload: json!({
                        "backup": backup.display().to_string(),
                        "reason": reason,
                    }),
                    timestamp: Utc::now(),
                });
                fresh.version = 1;
                Ok(fresh)
            }
            Err(e) => Err(e),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the snapshot file, if this store is durable.
    pub fn data_path(&self) -> Option<&std::path::Path> {
        self.paths.as_ref().map(|p| p.data.as_path())
    }

    fn state(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `key` to `value`. Returns the new version.
    pub fn set(&self, key: impl Into<String>, value: Value) -> u64 {
        let key = key.into();
        let mut state = self.state();
        state.version += 1;
        debug!(store = %self.id, key = %key, version = state.version, "context set");
        state.data.insert(key, value);
        state.version
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state().data.get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().data.keys().cloned().collect()
    }

    /// Append to the event log. Returns the new version.
    pub fn append_event(&self, kind: impl Into<String>, payload: Value) -> u64 {
        let kind = kind.into();
        let mut state = self.state();
        state.version += 1;
        info!(store = %self.id, kind = %kind, %payload, "context event");
        state.events.push(Event {
            kind,
            payload,
            timestamp: Utc::now(),
        });
        state.version
    }

    /// Register an artifact produced by `owner`. Returns the new version.
    pub fn add_artifact(&self, owner: impl Into<String>, location: impl Into<String>) -> u64 {
        let artifact = Artifact {
            owner: owner.into(),
            location: location.into(),
            timestamp: Utc::now(),
        };
        let mut state = self.state();
        state.version += 1;
        debug!(
            store = %self.id,
            owner = %artifact.owner,
            location = %artifact.location,
            version = state.version,
            "artifact registered"
        );
        state.artifacts.push(artifact);
        state.version
    }

    /// Read-modify-write of `key` as one critical section.
    ///
    /// `update` receives the current value (if any) and returns the new one.
    /// No other mutation of the store can interleave. Returns the stored value.
    pub fn atomic_update<F>(&self, key: &str, update: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut state = self.state();
        let next = update(state.data.get(key));
        state.version += 1;
        debug!(store = %self.id, key = %key, version = state.version, "atomic update");
        state.data.insert(key.to_string(), next.clone());
        next
    }

    pub fn version(&self) -> u64 {
        self.state().version
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn events_of_kind(&self, kind: &str) -> Vec<Event> {
        self.state()
            .events
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.state().artifacts.clone()
    }

    /// Persist the current state. Returns the version now on disk.
    ///
    /// The snapshot is taken under the exclusive lock, and the write is
    /// skipped when the disk already holds the same or a newer version, so
    /// the persisted version never moves backwards.
    pub async fn save(&self) -> Result<u64, StoreError> {
        let paths = self.paths.as_ref().ok_or(StoreError::NoStorage)?;

        let _guard =
            ScopedLock::acquire(&paths.lock, LockMode::Exclusive, self.lock_options).await?;
        let snapshot = self.snapshot();

        let on_disk = match persist::read_snapshot(&paths.data) {
            Ok(found) => found.map(|s| s.version),
            // Unreadable data is replaced outright.
            Err(StoreError::Corrupt { .. }) => None,
            Err(e) => return Err(e),
        };
        if let Some(disk) = on_disk.filter(|&disk| disk >= snapshot.version) {
            if disk > snapshot.version {
                warn!(
                    store = %self.id,
                    version = snapshot.version,
                    disk,
                    "disk holds a newer snapshot; save skipped"
                );
            } else {
                debug!(store = %self.id, version = disk, "snapshot already on disk");
            }
            return Ok(disk);
        }

        persist::write_atomic(paths, &snapshot)?;

        info!(store = %self.id, version = snapshot.version, "context store saved");
        Ok(snapshot.version)
    }

    /// Version embedded in the snapshot on disk, `None` if there is none.
    pub async fn disk_version(&self) -> Result<Option<u64>, StoreError> {
        let paths = self.paths.as_ref().ok_or(StoreError::NoStorage)?;
        let _guard =
            ScopedLock::acquire(&paths.lock, LockMode::Shared, self.lock_options).await?;
        Ok(persist::read_snapshot(&paths.data)?.map(|s| s.version))
    }

    /// Whether the snapshot on disk is newer than this in-memory view.
    pub async fn is_stale(&self) -> Result<bool, StoreError> {
        Ok(self
            .disk_version()
            .await?
            .is_some_and(|disk| disk > self.version()))
    }
}
