use chrono::Utc;
use thiserror::Error;

use crate::feed::{normalize_published, FeedClient, FeedError, RssItem};
use crate::storage::{Database, DatabaseError, Feed, NewPost};

/// Title stored for items that arrive without one.
pub const UNTITLED: &str = "Untitled";

/// Feed-level failure of one ingestion cycle. Item-level problems never
/// surface here; they are counted in [`IngestReport`] instead.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The fetch attempt could not be recorded, so nothing was fetched.
    #[error("Failed to record fetch attempt for feed {feed_id}: {source}")]
    Store {
        feed_id: i64,
        #[source]
        source: DatabaseError,
    },
    /// The source could not be fetched or parsed. The attempt stays recorded.
    #[error("Failed to fetch {url}: {source}")]
    Source {
        url: String,
        #[source]
        source: FeedError,
    },
}

/// Per-item tally of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub feed_id: i64,
    /// Items in the fetched document.
    pub items: usize,
    /// New posts written.
    pub inserted: usize,
    /// Items whose URL was already stored.
    pub duplicates: usize,
    /// Items the store rejected for any other reason.
    pub failed: usize,
    /// Items without a link, never sent to the store.
    pub skipped: usize,
    /// Items stored (or attempted) without a published timestamp.
    pub undated: usize,
}

/// Run one fetch/persist cycle for `feed`.
///
/// 1. The attempt is recorded on the feed before any network traffic, so a
///    failing source still moves to the back of the staleness order.
/// 2. The feed is fetched once. On failure the cycle ends with
///    [`IngestError::Source`] and no posts are written.
/// 3. Every item is stored independently. A known URL counts as a duplicate,
///    any other store failure is logged and counted, and neither stops the
///    remaining items.
pub async fn scrape_feed(
    db: &Database,
    client: &FeedClient,
    feed: &Feed,
) -> Result<IngestReport, IngestError> {
    db.mark_feed_fetched(feed.id, Utc::now().timestamp())
        .await
        .map_err(|source| IngestError::Store {
            feed_id: feed.id,
            source,
        })?;

    let rss = client
        .fetch(&feed.url)
        .await
        .map_err(|source| IngestError::Source {
            url: feed.url.clone(),
            source,
        })?;

    let mut report = IngestReport {
        feed_id: feed.id,
        items: rss.items.len(),
        ..IngestReport::default()
    };

    for item in &rss.items {
        let Some(post) = to_new_post(feed.id, item) else {
            tracing::warn!(
                feed_id = feed.id,
                title = %item.title,
                "Skipping item without a link"
            );
            report.skipped += 1;
            continue;
        };

        if post.published_at.is_none() {
            report.undated += 1;
        }

        match db.create_post(&post).await {
            Ok(_) => report.inserted += 1,
            Err(DatabaseError::DuplicateKey(_)) => {
                tracing::debug!(feed_id = feed.id, url = %post.url, "Post already stored");
                report.duplicates += 1;
            }
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %post.url,
                    error = %e,
                    "Failed to store post"
                );
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        feed_id = feed.id,
        feed = %feed.name,
        items = report.items,
        inserted = report.inserted,
        duplicates = report.duplicates,
        failed = report.failed,
        "Feed collected"
    );
    Ok(report)
}

/// Map a fetched item onto a post row. `None` when the item has no link.
///
/// An unparseable date is logged and stored as absent rather than dropping
/// the item.
fn to_new_post(feed_id: i64, item: &RssItem) -> Option<NewPost> {
    if item.link.is_empty() {
        return None;
    }

    let published_at = match normalize_published(&item.pub_date) {
        Ok(date) => date.map(|d| d.timestamp()),
        Err(e) => {
            tracing::warn!(feed_id, url = %item.link, error = %e, "Storing post without a date");
            None
        }
    };

    let title = if item.title.is_empty() {
        UNTITLED.to_string()
    } else {
        item.title.clone()
    };

    Some(NewPost {
        feed_id,
        title,
        url: item.link.clone(),
        description: Some(item.description.clone()).filter(|d| !d.is_empty()),
        published_at,
    })
}
