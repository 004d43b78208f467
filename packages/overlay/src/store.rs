//! Overlay preference storage backends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{OverlayError, OverlayState};

/// Persists overlay state keyed by logical view ID.
///
/// Implementations must be `Send + Sync` so a store can be shared by the
/// map session task and UI code.
pub trait OverlayPreferenceStore: Send + Sync {
    /// Loads the saved state for `view_id`, or `None` if nothing is saved.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the backing storage cannot be read.
    fn load(&self, view_id: &str) -> Result<Option<OverlayState>, OverlayError>;

    /// Saves `state` for `view_id`.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the backing storage cannot be written.
    fn save(&self, view_id: &str, state: &OverlayState) -> Result<(), OverlayError>;
}

/// Keeps preferences in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    views: Mutex<BTreeMap<String, OverlayState>>,
}

impl MemoryPreferenceStore {
    fn views(&self) -> MutexGuard<'_, BTreeMap<String, OverlayState>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OverlayPreferenceStore for MemoryPreferenceStore {
    fn load(&self, view_id: &str) -> Result<Option<OverlayState>, OverlayError> {
        Ok(self.views().get(view_id).cloned())
    }

    fn save(&self, view_id: &str, state: &OverlayState) -> Result<(), OverlayError> {
        self.views().insert(view_id.to_string(), state.clone());
        Ok(())
    }
}

/// On-disk layout: one table per view.
///
/// ```toml
/// [views.map]
/// enabled = true
/// layers = [0, 3]
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(default)]
    views: BTreeMap<String, OverlayState>,
}

/// Stores every view's preferences in a single TOML file.
///
/// Writes go to a sibling temp file that is then renamed over the original,
/// so a crash mid-write never leaves a truncated file behind.
#[derive(Debug)]
pub struct TomlPreferenceStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles.
    lock: Mutex<()>,
}

impl TomlPreferenceStore {
    /// Creates a store backed by the file at `path`. The file is created on
    /// first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<PreferenceFile, OverlayError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(toml::de::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PreferenceFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(&self, file: &PreferenceFile) -> Result<(), OverlayError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let contents = toml::to_string(file)?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl OverlayPreferenceStore for TomlPreferenceStore {
    fn load(&self, view_id: &str) -> Result<Option<OverlayState>, OverlayError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read_file()?;
        Ok(file.views.remove(view_id))
    }

    fn save(&self, view_id: &str, state: &OverlayState) -> Result<(), OverlayError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read_file()?;
        file.views.insert(view_id.to_string(), state.clone());
        self.write_file(&file)?;
        log::trace!("Saved overlay preferences for {view_id} to {}", self.path.display());
        Ok(())
    }
}
