use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use std::fs::{File, OpenOptions};

use crate::StorageError;

/// Exclusive advisory lock held on a sidecar file until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: Utf8PathBuf,
}

impl FileLock {
    /// Sidecar lock path for a target file: `<target>.lock`.
    pub fn path_for(target: &Utf8Path) -> Utf8PathBuf {
        let name = target.file_name().unwrap_or("state");
        target.with_file_name(format!("{name}.lock"))
    }

    /// Block until the lock for `target` is ours.
    pub fn acquire(target: &Utf8Path) -> Result<Self, StorageError> {
        let path = Self::path_for(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let wrap = |source| StorageError::Lock {
            path: path.to_string(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(wrap)?;
        file.lock_exclusive().map_err(wrap)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!("failed to release lock {}: {e}", self.path);
        }
    }
}
