use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::lock::FileLock;
use crate::paths::StoreLayout;
use crate::tracking_file::{decode_tracking_file, encode_tracking_file, TrackingState};
use crate::StorageError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedTracking {
    pub state: TrackingState,
    /// Schema the file was stored in; `None` when no usable file existed.
    pub source_version: Option<u32>,
}

/// Reads and writes one org's tracking file.
#[derive(Debug, Clone)]
pub struct TrackingFileStore {
    path: Utf8PathBuf,
}

impl TrackingFileStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_layout(layout: &StoreLayout) -> Self {
        Self::new(layout.tracking_file())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Missing or unreadable files load as empty state.
    pub fn read(&self) -> LoadedTracking {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path, "no tracking file yet");
                return LoadedTracking::default();
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "could not read tracking file, starting empty");
                return LoadedTracking::default();
            }
        };
        match decode_tracking_file(&bytes) {
            Ok((state, version)) => LoadedTracking {
                state,
                source_version: Some(version),
            },
            Err(e) => {
                warn!(path = %self.path, error = %e, "tracking file is corrupt, starting empty");
                LoadedTracking::default()
            }
        }
    }

    /// Lock, write to a temp file, then rename over the target.
    pub fn write(&self, state: &TrackingState, version: u32) -> Result<(), StorageError> {
        let bytes = encode_tracking_file(state, version)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _lock = FileLock::acquire(&self.path)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %self.path, version, records = state.records.len(), "tracking file written");
        Ok(())
    }

    pub fn remove(&self) -> Result<(), StorageError> {
        let _lock = FileLock::acquire(&self.path)?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
