//! Persistence store.
//!
//! The whole mapping of user → [`PhaseRecord`] lives in memory and is
//! written as one pretty-printed JSON snapshot. Saves replace the file
//! atomically (temp file + rename); the last save wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::StoreError;
use crate::ids::UserId;
use crate::phase::PhaseRecord;

/// Store handle shared by the sweep task, event handlers and the HTTP API.
///
/// Never hold the guard across a platform call.
pub type SharedStore = Arc<tokio::sync::Mutex<TimerStore>>;

/// In-memory timer mapping bound to its data file.
#[derive(Debug, Clone)]
pub struct TimerStore {
    path: PathBuf,
    records: BTreeMap<UserId, PhaseRecord>,
}

impl TimerStore {
    /// An empty store that will save to `path`.
    #[must_use]
    pub const fn empty(path: PathBuf) -> Self {
        Self {
            path,
            records: BTreeMap::new(),
        }
    }

    /// Loads the snapshot at `path`.
    ///
    /// A missing file yields an empty store. An empty file is treated the
    /// same way.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, and
    /// [`StoreError::Corrupt`] if it is not a valid snapshot.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no data file, starting empty");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        if raw.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let records: BTreeMap<UserId, PhaseRecord> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(source) => return Err(StoreError::Corrupt { path, source }),
        };
        info!(path = %path.display(), records = records.len(), "loaded timer data");

        Ok(Self { path, records })
    }

    /// Writes the full snapshot, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if any filesystem step fails. The
    /// in-memory state is untouched either way.
    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(&self.records)
            .map_err(|e| io_err(io::Error::other(e)))?;

        let tmp = temp_path(&self.path);
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), records = self.records.len(), "saved timer data");
        Ok(())
    }

    /// Wraps the store for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// The data file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record for `user`, if tracked.
    #[must_use]
    pub fn get(&self, user: UserId) -> Option<&PhaseRecord> {
        self.records.get(&user)
    }

    /// Inserts or replaces a record.
    pub fn insert(&mut self, user: UserId, record: PhaseRecord) {
        self.records.insert(user, record);
    }

    /// Removes a record, returning it.
    pub fn remove(&mut self, user: UserId) -> Option<PhaseRecord> {
        self.records.remove(&user)
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Whether `user` is tracked.
    #[must_use]
    pub fn contains(&self, user: UserId) -> bool {
        self.records.contains_key(&user)
    }

    /// Number of tracked users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no user is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in user id order.
    pub fn iter(&self) -> impl Iterator<Item = (UserId, &PhaseRecord)> {
        self.records.iter().map(|(user, record)| (*user, record))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
