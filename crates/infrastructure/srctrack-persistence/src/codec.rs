use crate::api::{CommitRecord, TrackedFile};
use crate::StorageError;

pub fn encode_tracked(entry: &TrackedFile) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(entry)?)
}

pub fn decode_tracked(bytes: &[u8]) -> Result<TrackedFile, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_commit(commit: &CommitRecord) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(commit)?)
}

pub fn decode_commit(bytes: &[u8]) -> Result<CommitRecord, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}
