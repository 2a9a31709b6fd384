use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedWithOwner};

impl Database {
    // ========================================================================
    // Feed Directory Operations
    // ========================================================================

    /// Register a feed owned by `user_id`.
    ///
    /// A URL that is already registered yields [`DatabaseError::DuplicateKey`].
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let feed: Feed = sqlx::query_as(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, url, user_id, created_at, last_fetched_at
        "#,
        )
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_insert)?;

        Ok(feed)
    }

    /// All feeds in insertion order.
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(
            "SELECT id, name, url, user_id, created_at, last_fetched_at FROM feeds ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feeds)
    }

    /// All feeds with the owning user's name, for listing.
    pub async fn get_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, DatabaseError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.id, f.name, f.url, u.name AS user_name, f.last_fetched_at
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(
            "SELECT id, name, url, user_id, created_at, last_fetched_at FROM feeds WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feed)
    }

    /// Record a fetch attempt at unix time `at`.
    ///
    /// The stored value never moves backwards: an `at` older than the current
    /// `last_fetched_at` leaves it unchanged.
    pub async fn mark_feed_fetched(&self, feed_id: i64, at: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE feeds SET last_fetched_at = max(COALESCE(last_fetched_at, ?1), ?1) WHERE id = ?2",
        )
        .bind(at)
        .bind(feed_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// The stalest feed: never fetched first, then oldest attempt, ties by id.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, name, url, user_id, created_at, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at, id
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(feed)
    }
}
