use uuid::Uuid;

use super::schema::Database;
use super::types::{now_millis, DatabaseError, FeedFollow};

const FOLLOW_SELECT: &str = r#"
    SELECT ff.id, ff.created_at, ff.updated_at, ff.user_id, ff.feed_id,
           f.name AS feed_name, u.name AS user_name
    FROM feed_follows ff
    JOIN feeds f ON f.id = ff.feed_id
    JOIN users u ON u.id = ff.user_id
"#;

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Subscribe `user_id` to `feed_id`.
    ///
    /// Returns [`DatabaseError::AlreadyFollowing`] if the pair exists.
    pub async fn create_feed_follow(
        &self,
        user_id: Uuid,
        feed_id: Uuid,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = now_millis();
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, feed_id) DO NOTHING
            RETURNING id
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        let (follow_id,) = inserted.ok_or(DatabaseError::AlreadyFollowing)?;

        let follow = sqlx::query_as::<_, FeedFollow>(&format!("{FOLLOW_SELECT} WHERE ff.id = ?"))
            .bind(follow_id)
            .fetch_optional(&self.pool)
            .await?;
        follow.ok_or(DatabaseError::NotFound("feed follow"))
    }

    /// Feeds followed by `user_id`, oldest follow first.
    pub async fn get_feed_follows_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<FeedFollow>, DatabaseError> {
        let follows = sqlx::query_as::<_, FeedFollow>(&format!(
            "{FOLLOW_SELECT} WHERE ff.user_id = ? ORDER BY ff.created_at, ff.rowid"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }

    /// Remove a subscription.
    ///
    /// Returns [`DatabaseError::NotFound`] if the user was not following it.
    pub async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("feed follow"));
        }
        Ok(())
    }
}
