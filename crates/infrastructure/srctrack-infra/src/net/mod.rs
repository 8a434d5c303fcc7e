use async_trait::async_trait;
use reqwest::Client;
use srctrack_core::{FeedError, RemoteFeed, RemoteFeedRecord};
use tracing::debug;

/// Reads the revision feed over HTTP.
///
/// `GET <base>/revisions?from=N` returns records above `N`, `?to=N` records up to
/// and including `N`. Both answer with a JSON array of feed records. The caller
/// supplies a `Client` already configured with whatever authentication it needs.
#[derive(Clone)]
pub struct HttpRemoteFeed {
    client: Client,
    base_url: String,
}

impl HttpRemoteFeed {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/revisions", self.base_url)
    }

    async fn fetch(&self, param: &str, revision: u64) -> Result<Vec<RemoteFeedRecord>, FeedError> {
        let url = self.endpoint();
        debug!(%url, param, revision, "querying remote feed");

        let resp = self
            .client
            .get(&url)
            .query(&[(param, revision)])
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        resp.json::<Vec<RemoteFeedRecord>>()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteFeed for HttpRemoteFeed {
    async fn query_from(&self, revision: u64) -> Result<Vec<RemoteFeedRecord>, FeedError> {
        self.fetch("from", revision).await
    }

    async fn query_to(&self, revision: u64) -> Result<Vec<RemoteFeedRecord>, FeedError> {
        self.fetch("to", revision).await
    }
}
