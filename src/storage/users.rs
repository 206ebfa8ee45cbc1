use uuid::Uuid;

use super::schema::Database;
use super::types::{now_millis, DatabaseError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user with a unique name.
    ///
    /// Returns [`DatabaseError::DuplicateUser`] when the name is taken.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = now_millis();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, created_at, updated_at, name)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            RETURNING id, created_at, updated_at, name
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or_else(|| DatabaseError::DuplicateUser(name.to_string()))
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, created_at, updated_at, name FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// All users, oldest registration first.
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, created_at, updated_at, name FROM users ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Delete every user; their feeds, follows and posts cascade.
    ///
    /// Returns the number of users removed.
    pub async fn reset_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;
        let created = db.create_user("lane").await.unwrap();

        let fetched = db.get_user_by_name("lane").await.unwrap().unwrap();
        assert_eq!(created, fetched);
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let db = test_db().await;
        db.create_user("lane").await.unwrap();

        let err = db.create_user("lane").await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateUser(ref n) if n == "lane"));
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let db = test_db().await;
        assert!(db.get_user_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_users_in_registration_order() {
        let db = test_db().await;
        for name in ["kahya", "holgith", "lane"] {
            db.create_user(name).await.unwrap();
        }
        let names: Vec<_> = db
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["kahya", "holgith", "lane"]);
    }

    #[tokio::test]
    async fn test_reset_users_cascades() {
        let db = test_db().await;
        let user = db.create_user("lane").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/rss", user.id)
            .await
            .unwrap();
        db.create_feed_follow(user.id, feed.id).await.unwrap();

        assert_eq!(db.reset_users().await.unwrap(), 1);
        assert!(db.list_users().await.unwrap().is_empty());
        assert!(db.list_feeds().await.unwrap().is_empty());
        assert!(db.next_feed_to_fetch().await.unwrap().is_none());
    }
}
