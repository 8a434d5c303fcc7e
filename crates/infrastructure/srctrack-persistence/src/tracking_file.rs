//! The remote tracking file (`maxRevision.json`) in its two schema versions.
//!
//! Version 1 stores full feed records keyed `<type>###<name>`. Version 0 stores a
//! flatter record keyed `<type>__<name>` and has no `fileVersion` field in older
//! files. Both decode into [`TrackingState`]; version 0 is upgraded on the way in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use srctrack_core::key::{decode_name, legacy_key, legacy_name, metadata_key, LEGACY_KEY_SEPARATOR};
use srctrack_core::RemoteRecord;

use crate::StorageError;

/// In-memory tracking state, always in the current key schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingState {
    pub server_max_revision: u64,
    pub records: BTreeMap<String, RemoteRecord>,
}

impl TrackingState {
    /// Raise the high-water mark to cover every stored record.
    pub fn normalize_max(&mut self) {
        let highest = self
            .records
            .values()
            .map(|r| r.revision_counter)
            .max()
            .unwrap_or(0);
        self.server_max_revision = self.server_max_revision.max(highest);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingFileV1 {
    pub file_version: u32,
    pub server_max_revision_counter: u64,
    #[serde(default)]
    pub source_members: BTreeMap<String, RemoteRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMember {
    pub member_type: String,
    pub server_revision_counter: u64,
    pub last_retrieved_from_server: Option<u64>,
    #[serde(default)]
    pub is_name_obsolete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingFileV0 {
    #[serde(default)]
    pub file_version: u32,
    #[serde(default)]
    pub server_max_revision_counter: u64,
    #[serde(default)]
    pub source_members: BTreeMap<String, LegacyMember>,
}

/// Upgrade a legacy file. Fields version 0 never stored are left empty.
pub fn upgrade_legacy(file: TrackingFileV0) -> TrackingState {
    let records = file
        .source_members
        .into_iter()
        .map(|(key, member)| {
            let name = legacy_name(&key, &member.member_type)
                .or_else(|| key.split_once(LEGACY_KEY_SEPARATOR).map(|(_, n)| n))
                .unwrap_or(&key);
            let name = decode_name(name).into_owned();
            let record = RemoteRecord {
                member_type: member.member_type,
                member_name: name,
                is_obsolete: member.is_name_obsolete,
                is_new: false,
                revision_counter: member.server_revision_counter,
                changed_by: String::new(),
                member_id: String::new(),
                last_modified: String::new(),
                last_retrieved_revision: member.last_retrieved_from_server,
            };
            (metadata_key(&record.member_type, &record.member_name), record)
        })
        .collect();
    let mut state = TrackingState {
        server_max_revision: file.server_max_revision_counter,
        records,
    };
    state.normalize_max();
    state
}

/// Decode either schema. Returns the state and the version it was stored in.
pub fn decode_tracking_file(bytes: &[u8]) -> Result<(TrackingState, u32), StorageError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let version = value.get("fileVersion").and_then(Value::as_u64).unwrap_or(0);
    match version {
        0 => {
            let file: TrackingFileV0 = serde_json::from_value(value)?;
            Ok((upgrade_legacy(file), 0))
        }
        1 => {
            let file: TrackingFileV1 = serde_json::from_value(value)?;
            let records = file
                .source_members
                .into_values()
                .map(|r| (r.key(), r))
                .collect();
            let mut state = TrackingState {
                server_max_revision: file.server_max_revision_counter,
                records,
            };
            state.normalize_max();
            Ok((state, 1))
        }
        other => Err(StorageError::UnsupportedFileVersion(other)),
    }
}

pub fn encode_tracking_file(state: &TrackingState, version: u32) -> Result<Vec<u8>, StorageError> {
    let bytes = match version {
        0 => {
            let source_members = state
                .records
                .values()
                .map(|r| {
                    (
                        legacy_key(&r.member_type, &r.member_name),
                        LegacyMember {
                            member_type: r.member_type.clone(),
                            server_revision_counter: r.revision_counter,
                            last_retrieved_from_server: r.last_retrieved_revision,
                            is_name_obsolete: r.is_obsolete,
                        },
                    )
                })
                .collect();
            serde_json::to_vec_pretty(&TrackingFileV0 {
                file_version: 0,
                server_max_revision_counter: state.server_max_revision,
                source_members,
            })?
        }
        1 => serde_json::to_vec_pretty(&TrackingFileV1 {
            file_version: 1,
            server_max_revision_counter: state.server_max_revision,
            source_members: state.records.clone(),
        })?,
        other => return Err(StorageError::UnsupportedFileVersion(u64::from(other))),
    };
    Ok(bytes)
}
