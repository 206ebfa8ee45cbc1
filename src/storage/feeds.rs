use uuid::Uuid;

use super::schema::Database;
use super::types::{now_millis, DatabaseError, Feed, FeedListing};

const FEED_COLUMNS: &str = "id, created_at, updated_at, name, url, user_id, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`.
    ///
    /// Feed URLs are globally unique; a second registration of the same URL
    /// returns [`DatabaseError::DuplicateFeed`].
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: Uuid,
    ) -> Result<Feed, DatabaseError> {
        let now = now_millis();
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        feed.ok_or_else(|| DatabaseError::DuplicateFeed(url.to_string()))
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Every feed with the name of the user who added it, in creation order.
    pub async fn list_feeds(&self) -> Result<Vec<FeedListing>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedListing>(
            r#"
            SELECT f.name, f.url, u.name AS user_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.created_at, f.rowid
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// The feed that has waited longest for a fetch.
    ///
    /// Never-fetched feeds come first, then the oldest `last_fetched_at`.
    /// Ties go to the feed registered first.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at, rowid
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Stamp a feed as fetched now.
    pub async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), DatabaseError> {
        self.mark_feed_fetched_at(feed_id, now_millis()).await
    }

    /// Stamp a feed as fetched at `at` (Unix milliseconds).
    ///
    /// Returns [`DatabaseError::NotFound`] if no feed has this id.
    pub async fn mark_feed_fetched_at(&self, feed_id: Uuid, at: i64) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(at)
                .bind(at)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("feed"));
        }
        Ok(())
    }
}
