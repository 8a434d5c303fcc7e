use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use srctrack_core::{FeedError, RemoteFeed, RemoteFeedRecord};

/// A feed backed by a vector; useful for tests and offline embedders.
#[derive(Debug, Default)]
pub struct InMemoryFeed {
    records: Mutex<Vec<RemoteFeedRecord>>,
    queries: AtomicUsize,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = RemoteFeedRecord>) -> Self {
        let feed = Self::new();
        feed.extend(records);
        feed
    }

    pub fn push(&self, record: RemoteFeedRecord) {
        self.extend([record]);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = RemoteFeedRecord>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
    }

    /// Highest revision currently in the feed, 0 when empty.
    pub fn max_revision(&self) -> u64 {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.revision_counter)
            .max()
            .unwrap_or(0)
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn select(&self, pred: impl Fn(u64) -> bool) -> Vec<RemoteFeedRecord> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let mut out: Vec<RemoteFeedRecord> = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| pred(r.revision_counter))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.revision_counter);
        out
    }
}

#[async_trait::async_trait]
impl RemoteFeed for InMemoryFeed {
    async fn query_from(&self, revision: u64) -> Result<Vec<RemoteFeedRecord>, FeedError> {
        Ok(self.select(|rev| rev > revision))
    }

    async fn query_to(&self, revision: u64) -> Result<Vec<RemoteFeedRecord>, FeedError> {
        Ok(self.select(|rev| rev <= revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_is_exclusive_and_to_is_inclusive() {
        let feed = InMemoryFeed::with_records([
            RemoteFeedRecord::new("ApexClass", "A", 1),
            RemoteFeedRecord::new("ApexClass", "B", 2),
            RemoteFeedRecord::new("ApexClass", "C", 3),
        ]);
        let from: Vec<u64> = feed.query_from(1).await.unwrap().iter().map(|r| r.revision_counter).collect();
        let to: Vec<u64> = feed.query_to(2).await.unwrap().iter().map(|r| r.revision_counter).collect();
        assert_eq!(from, vec![2, 3]);
        assert_eq!(to, vec![1, 2]);
        assert_eq!(feed.query_count(), 2);
        assert_eq!(feed.max_revision(), 3);
    }
}
