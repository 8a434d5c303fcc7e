use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use srctrack_core::ObjectId;

pub const TRACKING_FILENAME: &str = "maxRevision.json";
pub const LOCAL_STORE_DIRNAME: &str = "localSourceTracking";
pub const INDEX_FILENAME: &str = "index.redb";
pub const OBJECTS_DIRNAME: &str = "objects";
pub const CURRENT_SCHEMA: u32 = 1;

/// Content and stat data for one path, as committed or as last hashed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedFile {
    pub oid: ObjectId,
    pub size: u64,
    pub mtime: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: ObjectId,
    pub parent: Option<ObjectId>,
    pub message: String,
    pub timestamp: String,
    pub staged: usize,
    pub removed: usize,
}

/// The local shadow store's index: committed snapshot, stat cache and commit log.
pub trait ShadowIndex: Send + Sync {
    /// Path -> committed entry for the current head.
    fn snapshot(&self) -> Result<BTreeMap<String, TrackedFile>, crate::StorageError>;

    /// Path -> last hashed working-tree entry.
    fn stat_cache(&self) -> Result<HashMap<String, TrackedFile>, crate::StorageError>;

    fn update_stat_cache(
        &self,
        upserts: &[(String, TrackedFile)],
        removals: &[String],
    ) -> Result<(), crate::StorageError>;

    /// Stage and remove paths in one transaction. `None` when nothing changed.
    fn apply_commit(
        &self,
        staged: &[(String, TrackedFile)],
        removed: &[String],
        message: &str,
    ) -> Result<Option<CommitRecord>, crate::StorageError>;

    fn head(&self) -> Result<Option<CommitRecord>, crate::StorageError>;

    fn commit_log(&self) -> Result<Vec<CommitRecord>, crate::StorageError>;
}
