//! SQLite persistence for users, feeds and posts.
//!
//! [`Database`] is a cheap-to-clone handle around a sqlx pool. Operations are
//! split by table across submodules, each adding an `impl Database` block.

mod feeds;
mod posts;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{DatabaseError, Feed, FeedWithOwner, NewPost, Post, PostWithFeed, User};
