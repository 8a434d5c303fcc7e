use srctrack_infra::{is_too_many_open_files, HashError};
use srctrack_persistence::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum LocalTrackingError {
    /// Any failure inside the shadow store. The message is for humans only.
    #[error("internal local source tracking error: {0}")]
    Internal(String),
    #[error(
        "too many open files while updating local source tracking (batch size {batch_size}); \
         raise the open file limit (for example `ulimit -n`) or lower SRCTRACK_LOCAL_BATCH_SIZE"
    )]
    TooManyOpenFiles { batch_size: usize },
    #[error("local source tracking was deleted; create a new tracker before using it")]
    Deleted,
    #[error("path is outside the project: {0}")]
    OutsideProject(String),
}

impl LocalTrackingError {
    pub(crate) fn from_io(err: std::io::Error, batch_size: usize) -> Self {
        if is_too_many_open_files(&err) {
            LocalTrackingError::TooManyOpenFiles { batch_size }
        } else {
            LocalTrackingError::Internal(err.to_string())
        }
    }

    pub(crate) fn from_storage(err: StorageError, batch_size: usize) -> Self {
        match err.io_error() {
            Some(io) if is_too_many_open_files(io) => LocalTrackingError::TooManyOpenFiles { batch_size },
            _ => LocalTrackingError::Internal(err.to_string()),
        }
    }

    pub(crate) fn from_hash(err: HashError, batch_size: usize) -> Self {
        if is_too_many_open_files(err.io_error()) {
            LocalTrackingError::TooManyOpenFiles { batch_size }
        } else {
            LocalTrackingError::Internal(err.to_string())
        }
    }
}
