use super::schema::Database;
use super::types::{DatabaseError, NewPost, Post, PostWithFeed};

/// Maximum number of posts returned by a single browse query (OOM protection)
const MAX_BROWSE_LIMIT: i64 = 1000;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post. The store enforces uniqueness on the item URL, so a
    /// post that was already ingested returns [`DatabaseError::DuplicateKey`]
    /// and leaves the existing row untouched.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let created: Post = sqlx::query_as(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, feed_id, title, url, description, published_at, created_at
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_insert)?;

        Ok(created)
    }

    /// All posts of one feed, newest first (undated posts last).
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at IS NULL, published_at DESC, id DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(posts)
    }

    /// Browse read path: the newest `limit` posts across the feeds owned by
    /// `user_id`.
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<PostWithFeed>, DatabaseError> {
        let limit = limit.clamp(0, MAX_BROWSE_LIMIT);
        let posts = sqlx::query_as::<_, PostWithFeed>(
            r#"
            SELECT p.id, f.name AS feed_name, p.title, p.url, p.description,
                   p.published_at, p.created_at
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            WHERE f.user_id = ?
            ORDER BY p.published_at IS NULL, p.published_at DESC, p.created_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(posts)
    }
}
