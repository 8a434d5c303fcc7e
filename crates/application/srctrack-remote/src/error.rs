use srctrack_core::FeedError;
use srctrack_persistence::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum RemoteTrackingError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("could not persist remote tracking state: {0}")]
    Storage(#[from] StorageError),
    /// Feed rows need both a member type and a member name to be keyed.
    #[error("remote change at revision {revision} is missing its member type or name")]
    MalformedRecord { revision: u64 },
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for RemoteTrackingError {
    fn from(err: tokio::task::JoinError) -> Self {
        RemoteTrackingError::Task(err.to_string())
    }
}
