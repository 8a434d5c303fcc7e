use crate::remote::RemoteFeedRecord;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("remote feed request failed: {0}")]
    Transport(String),
    #[error("remote feed returned status {0}")]
    Status(u16),
    #[error("remote feed response could not be decoded: {0}")]
    Decode(String),
}

/// The remote service's revision-numbered change feed.
#[async_trait::async_trait]
pub trait RemoteFeed: Send + Sync {
    /// Every record with a revision counter strictly greater than `revision`.
    async fn query_from(&self, revision: u64) -> Result<Vec<RemoteFeedRecord>, FeedError>;

    /// Every record with a revision counter up to and including `revision`.
    async fn query_to(&self, revision: u64) -> Result<Vec<RemoteFeedRecord>, FeedError>;
}
