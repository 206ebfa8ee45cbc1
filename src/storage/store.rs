use async_trait::async_trait;
use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewPost, Post};

/// The slice of storage the ingestion loop needs.
///
/// [`Database`] is the production implementation; tests wrap it to inject
/// failures or observe call order.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Feed with the oldest (or missing) `last_fetched_at`, if any exist.
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError>;

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), DatabaseError>;

    /// Must return [`DatabaseError::DuplicatePostUrl`] for a known URL.
    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), DatabaseError> {
        Database::mark_feed_fetched(self, feed_id).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        Database::create_post(self, post).await
    }
}
