use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages.
///
/// Uniqueness conflicts are reported as their own variants so callers never
/// inspect the engine's error text.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another gator process. Please stop it and try again.")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("user {0:?} already exists")]
    DuplicateUser(String),

    #[error("a feed with URL {0} already exists")]
    DuplicateFeed(String),

    #[error("already following this feed")]
    AlreadyFollowing,

    /// A post with this URL is already stored (from any feed)
    #[error("post with URL {0} already exists")]
    DuplicatePostUrl(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error raised while opening the pool.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // SQLITE_BUSY (5), SQLITE_LOCKED (6)
            if matches!(db_err.code().as_deref(), Some("5") | Some("6")) {
                return DatabaseError::InstanceLocked;
            }
        }
        DatabaseError::Other(err)
    }
}

// ============================================================================
// Records
// ============================================================================

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    /// `None` until the aggregator first selects this feed
    pub last_fetched_at: Option<i64>,
}

/// Feed row joined with the name of the user who added it.
#[derive(Debug, Clone, FromRow)]
pub struct FeedListing {
    pub name: String,
    pub url: String,
    pub user_name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct FeedFollow {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub feed_name: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_id: Uuid,
}

/// Insert parameters for a post; the caller chooses identity and timestamps.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_id: Uuid,
}
