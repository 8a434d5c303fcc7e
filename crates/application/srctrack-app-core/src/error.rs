use srctrack_local::LocalTrackingError;
use srctrack_remote::RemoteTrackingError;

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error(transparent)]
    Local(#[from] LocalTrackingError),
    #[error(transparent)]
    Remote(#[from] RemoteTrackingError),
    #[error("tracking task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for TrackingError {
    fn from(err: tokio::task::JoinError) -> Self {
        TrackingError::Task(err.to_string())
    }
}
