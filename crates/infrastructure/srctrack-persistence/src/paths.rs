use camino::{Utf8Path, Utf8PathBuf};
use srctrack_core::path_utils::TrackPath;

use crate::api::{LOCAL_STORE_DIRNAME, TRACKING_FILENAME};
use crate::StorageError;

pub fn normalize_rel_path(rel_path: &str) -> Result<String, StorageError> {
    let normalized = TrackPath::normalize(rel_path);
    validate_relative_path(&normalized)?;
    Ok(normalized)
}

pub fn validate_relative_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() || !TrackPath::verify_safe(path) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Where one org's tracking state lives inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreLayout {
    project: Utf8PathBuf,
    org: String,
}

impl StoreLayout {
    pub fn new(project: impl Into<Utf8PathBuf>, org: impl Into<String>) -> Result<Self, StorageError> {
        let org = org.into();
        if org.is_empty() || org.contains(['/', '\\']) || org == "." || org == ".." {
            return Err(StorageError::InvalidPath(org));
        }
        Ok(Self {
            project: project.into(),
            org,
        })
    }

    pub fn project(&self) -> &Utf8Path {
        &self.project
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// `<project>/.sf/orgs/<org>`
    pub fn org_dir(&self) -> Utf8PathBuf {
        self.project.join(".sf").join("orgs").join(&self.org)
    }

    pub fn tracking_file(&self) -> Utf8PathBuf {
        self.org_dir().join(TRACKING_FILENAME)
    }

    pub fn local_store_dir(&self) -> Utf8PathBuf {
        self.org_dir().join(LOCAL_STORE_DIRNAME)
    }
}
