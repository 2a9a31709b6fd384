use super::schema::Database;
use super::types::{DatabaseError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. A taken name yields [`DatabaseError::DuplicateKey`].
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let user: User = sqlx::query_as(
            "INSERT INTO users (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_insert)?;
        Ok(user)
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT id, name, created_at FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(user)
    }

    pub async fn get_users(&self) -> Result<Vec<User>, DatabaseError> {
        let users = sqlx::query_as::<_, User>("SELECT id, name, created_at FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(users)
    }

    /// Delete every user. Feeds and posts go with them (ON DELETE CASCADE).
    ///
    /// Returns the number of users removed.
    pub async fn delete_all_users(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewPost};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;

        let created = db.create_user("kahya").await.unwrap();
        let found = db.get_user_by_name("kahya").await.unwrap();

        assert_eq!(found, Some(created));
        assert!(db.get_user_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_user_name_rejected() {
        let db = test_db().await;

        db.create_user("kahya").await.unwrap();
        let err = db.create_user("kahya").await.unwrap_err();

        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_get_users_sorted_by_name() {
        let db = test_db().await;
        db.create_user("zed").await.unwrap();
        db.create_user("amy").await.unwrap();

        let names: Vec<String> = db
            .get_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["amy".to_string(), "zed".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_all_users_cascades() {
        let db = test_db().await;
        let user = db.create_user("kahya").await.unwrap();
        let feed = db
            .create_feed("Feed", "https://example.com/rss", user.id)
            .await
            .unwrap();
        db.create_post(&NewPost {
            feed_id: feed.id,
            title: "Hello".to_string(),
            url: "https://example.com/hello".to_string(),
            description: None,
            published_at: None,
        })
        .await
        .unwrap();

        let removed = db.delete_all_users().await.unwrap();
        assert_eq!(removed, 1);

        assert!(db.get_feeds().await.unwrap().is_empty());
        assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());
    }
}
