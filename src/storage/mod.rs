mod feeds;
mod follows;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{
    now_millis, DatabaseError, Feed, FeedFollow, FeedListing, NewPost, Post, User,
};
