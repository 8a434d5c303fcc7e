use serde::{Deserialize, Serialize};

pub mod change;
pub mod component;
pub mod conflict;
pub mod feed;
pub mod key;
pub mod moves;
pub mod path_utils;
pub mod remote;
pub mod row;
pub mod telemetry;

pub use change::{ChangeOrigin, ChangeResult};
pub use component::{
    Component, ComponentIdentity, ComponentResolver, DefaultRegistry, IgnoreRules,
    MetadataRegistry, NoIgnore, ParentRef,
};
pub use conflict::{find_conflicts, ConflictRecord};
pub use feed::{FeedError, RemoteFeed};
pub use remote::{ComponentStatus, RemoteFeedRecord, RemoteRecord, RemoteSyncInput};
pub use row::{ChangeRow, CurrentState, PriorState};
pub use telemetry::{MemoryTelemetry, NoopTelemetry, TelemetrySink, TrackingEvent};

/// Hex digest naming a content object in the shadow store.
pub type ObjectId = String;

/// Sentinel returned by a commit that had nothing to stage.
pub const NO_FILES_TO_COMMIT: &str = "no files to commit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommitOutcome {
    Committed(ObjectId),
    NothingToCommit,
}

impl CommitOutcome {
    pub fn id(&self) -> &str {
        match self {
            CommitOutcome::Committed(id) => id,
            CommitOutcome::NothingToCommit => NO_FILES_TO_COMMIT,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, CommitOutcome::NothingToCommit)
    }
}

/// Paths to stage in a single commit to the shadow store.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    pub added_or_modified: Vec<String>,
    pub deleted: Vec<String>,
    pub message: String,
    /// Leave the cached scan invalid instead of rescanning after the commit.
    pub skip_status_refresh: bool,
}

impl CommitRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_added(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.added_or_modified
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_deleted(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.deleted.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn skip_status_refresh(mut self) -> Self {
        self.skip_status_refresh = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.added_or_modified.is_empty() && self.deleted.is_empty()
    }
}
