use thiserror::Error;

use crate::storage::{Database, DatabaseError, Feed};

#[derive(Debug, Error)]
pub enum SelectError {
    /// Nothing to poll yet. Recoverable: the next tick tries again.
    #[error("No feeds registered; add one with `gator addfeed <name> <url>`")]
    NoFeeds,
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Pick the feed to poll next: never-fetched feeds first, then the oldest
/// attempt, ties broken by insertion order.
pub async fn next_feed(db: &Database) -> Result<Feed, SelectError> {
    db.next_feed_to_fetch().await?.ok_or(SelectError::NoFeeds)
}
