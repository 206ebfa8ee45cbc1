use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, NewPost, Post};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post.
    ///
    /// Post URLs are unique across all feeds. An existing URL yields
    /// [`DatabaseError::DuplicatePostUrl`] and leaves the stored row untouched.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let inserted = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, created_at, updated_at, title, url, description, published_at, feed_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING id, created_at, updated_at, title, url, description, published_at, feed_id
        "#,
        )
        .bind(post.id)
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(post.feed_id)
        .fetch_optional(&self.pool)
        .await?;

        inserted.ok_or_else(|| DatabaseError::DuplicatePostUrl(post.url.clone()))
    }

    /// Newest posts from the feeds `user_id` follows.
    pub async fn get_posts_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT p.id, p.created_at, p.updated_at, p.title, p.url,
                   p.description, p.published_at, p.feed_id
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC, p.created_at DESC, p.rowid DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Every post stored for one feed, in insertion order.
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, created_at, updated_at, title, url, description, published_at, feed_id
            FROM posts
            WHERE feed_id = ?
            ORDER BY rowid
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}
