// src/store/persist.rs

//! File-level persistence helpers: atomic snapshot writes, corruption
//! quarantine and stale temp cleanup. Callers hold the appropriate
//! [`ScopedLock`](crate::store::ScopedLock) around these.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use crate::store::model::Snapshot;

const TEMP_SUFFIX: &str = ".tmp";
const CORRUPT_MARKER: &str = ".corrupt-";

/// File locations for one logical store identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub data: PathBuf,
    pub lock: PathBuf,
    data_file_name: String,
}

impl StorePaths {
    pub fn new(dir: impl Into<PathBuf>, id: &str) -> Result<Self, StoreError> {
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\'])
            || id.contains('\0')
        {
            return Err(StoreError::InvalidId(id.to_string()));
        }

        let dir = dir.into();
        let data_file_name = format!("{id}.json");
        Ok(Self {
            data: dir.join(&data_file_name),
            lock: dir.join(format!("{id}.lock")),
            dir,
            data_file_name,
        })
    }

    /// A fresh, unique temp path next to the data file.
    fn temp_path(&self) -> PathBuf {
        let nonce = format!(
            "{}-{}-{:08x}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            rand::random::<u32>()
        );
        self.dir
            .join(format!("{}.{nonce}{TEMP_SUFFIX}", self.data_file_name))
    }

    fn is_temp_file(&self, file_name: &str) -> bool {
        file_name.starts_with(&format!("{}.", self.data_file_name))
            && file_name.ends_with(TEMP_SUFFIX)
    }
}

/// Serialize `snapshot` to a temp file, fsync it, then rename it over the
/// data file. Readers see either the old or the new document, never a mix.
pub fn write_atomic(paths: &StorePaths, snapshot: &Snapshot) -> Result<(), StoreError> {
    fs::create_dir_all(&paths.dir)?;
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = paths.temp_path();

    let result = (|| -> Result<(), StoreError> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, &paths.data)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    } else {
        debug!(path = ?paths.data, version = snapshot.version, bytes = json.len(), "snapshot written");
    }
    result
}

/// Read and parse the data file.
///
/// `Ok(None)` when it does not exist; [`StoreError::Corrupt`] when it exists
/// but does not parse.
pub fn read_snapshot(path: &Path) -> Result<Option<Snapshot>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Io(e)),
    };

    serde_json::from_slice::<Snapshot>(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Move an unreadable data file aside as `<file>.corrupt-<UTC timestamp>`.
pub fn quarantine(path: &Path) -> Result<PathBuf, StoreError> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
    let mut backup = path.as_os_str().to_owned();
    backup.push(format!("{CORRUPT_MARKER}{stamp}"));
    let backup = PathBuf::from(backup);

    fs::rename(path, &backup)?;
    warn!(path = ?path, backup = ?backup, "quarantined corrupt snapshot");
    Ok(backup)
}

/// Delete temp files for this store older than `max_age`. Returns how many
/// were removed; failures are logged and skipped.
pub fn remove_stale_temps(paths: &StorePaths, max_age: Duration) -> usize {
    let entries = match fs::read_dir(&paths.dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return 0,
        Err(e) => {
            debug!(dir = ?paths.dir, error = %e, "cannot scan for stale temp files");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !paths.is_temp_file(name) {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        match age {
            Some(age) if age >= max_age => match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => debug!(file = %name, error = %e, "failed to remove stale temp file"),
            },
            _ => {}
        }
    }

    if removed > 0 {
        info!(dir = ?paths.dir, removed, "removed stale temp files");
    }
    removed
}
