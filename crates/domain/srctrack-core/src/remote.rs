use crate::key::metadata_key;
use serde::{Deserialize, Serialize};

/// One row of the remote revision feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteFeedRecord {
    #[serde(default)]
    pub member_type: String,
    #[serde(default)]
    pub member_name: String,
    #[serde(default)]
    pub is_name_obsolete: bool,
    #[serde(default)]
    pub is_new_member: bool,
    pub revision_counter: u64,
    #[serde(default)]
    pub changed_by: String,
    #[serde(default)]
    pub member_id_or_name: String,
    #[serde(default)]
    pub last_modified_date: String,
}

impl RemoteFeedRecord {
    pub fn new(member_type: impl Into<String>, member_name: impl Into<String>, revision: u64) -> Self {
        Self {
            member_type: member_type.into(),
            member_name: member_name.into(),
            is_name_obsolete: false,
            is_new_member: false,
            revision_counter: revision,
            changed_by: String::new(),
            member_id_or_name: String::new(),
            last_modified_date: String::new(),
        }
    }

    pub fn obsolete(mut self) -> Self {
        self.is_name_obsolete = true;
        self
    }

    pub fn new_member(mut self) -> Self {
        self.is_new_member = true;
        self
    }

    pub fn key(&self) -> String {
        metadata_key(&self.member_type, &self.member_name)
    }

    /// A record needs both a type and a name to be tracked.
    pub fn is_well_formed(&self) -> bool {
        !self.member_type.is_empty() && !self.member_name.is_empty()
    }
}

/// The cached view of one remote element and how far the caller has synced it.
///
/// `last_retrieved_revision == Some(revision_counter)` means the caller already has
/// this revision; anything else is an outstanding remote change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(rename = "MemberType")]
    pub member_type: String,
    #[serde(rename = "MemberName")]
    pub member_name: String,
    #[serde(rename = "IsNameObsolete")]
    pub is_obsolete: bool,
    #[serde(rename = "IsNewMember")]
    pub is_new: bool,
    #[serde(rename = "RevisionCounter")]
    pub revision_counter: u64,
    #[serde(rename = "ChangedBy", default)]
    pub changed_by: String,
    #[serde(rename = "MemberIdOrName", default)]
    pub member_id: String,
    #[serde(rename = "LastModifiedDate", default)]
    pub last_modified: String,
    #[serde(rename = "lastRetrievedFromServer", default)]
    pub last_retrieved_revision: Option<u64>,
}

impl RemoteRecord {
    pub fn from_feed(record: RemoteFeedRecord, synced: bool) -> Self {
        let revision = record.revision_counter;
        Self {
            member_type: record.member_type,
            member_name: crate::key::decode_name(&record.member_name).into_owned(),
            is_obsolete: record.is_name_obsolete,
            is_new: record.is_new_member,
            revision_counter: revision,
            changed_by: record.changed_by,
            member_id: record.member_id_or_name,
            last_modified: record.last_modified_date,
            last_retrieved_revision: synced.then_some(revision),
        }
    }

    /// Fold a newer feed row into an existing record, keeping its sync marker.
    pub fn absorb(&mut self, record: RemoteFeedRecord) {
        let previous = self.last_retrieved_revision;
        *self = Self::from_feed(record, false);
        self.last_retrieved_revision = previous;
    }

    pub fn key(&self) -> String {
        metadata_key(&self.member_type, &self.member_name)
    }

    pub fn is_synced(&self) -> bool {
        self.last_retrieved_revision == Some(self.revision_counter)
    }

    pub fn mark_synced(&mut self) {
        self.last_retrieved_revision = Some(self.revision_counter);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ComponentStatus {
    Created,
    Changed,
    Unchanged,
    Deleted,
    Failed,
}

/// An element known to have changed remotely, typically one line of a deploy result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncInput {
    pub full_name: String,
    #[serde(rename = "type")]
    pub member_type: String,
    pub state: ComponentStatus,
    #[serde(default)]
    pub file_path: Option<String>,
}

impl RemoteSyncInput {
    pub fn new(
        member_type: impl Into<String>,
        full_name: impl Into<String>,
        state: ComponentStatus,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            member_type: member_type.into(),
            state,
            file_path: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}
