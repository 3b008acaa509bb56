use sqlx::SqlitePool;

use crate::models::Post;
use crate::Result;

#[derive(Debug, Clone)]
pub struct PostRepository {
    pool: SqlitePool,
}

impl PostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, post: &Post) -> Result<()> {
        sqlx::query(
            "INSERT INTO posts (id, event_id, user_id, user_name, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.event_id)
        .bind(&post.user_id)
        .bind(&post.user_name)
        .bind(&post.content)
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT id, event_id, user_id, user_name, content, created_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    /// Posts tagged with `event_id`, in insertion order
    pub async fn list_for_event(&self, event_id: &str) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            "SELECT id, event_id, user_id, user_name, content, created_at
             FROM posts WHERE event_id = ? ORDER BY rowid",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Utc;

    #[tokio::test]
    async fn test_list_for_event() {
        let repo = Database::in_memory().await.unwrap().posts();
        for (id, event) in [("p1", Some("E1")), ("p2", None), ("p3", Some("E1")), ("p4", Some("E2"))] {
            repo.insert(&Post {
                id: id.into(),
                event_id: event.map(str::to_string),
                user_id: "u1".into(),
                user_name: None,
                content: "hello".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let ids: Vec<_> = repo
            .list_for_event("E1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert!(repo.get("p2").await.unwrap().unwrap().event_id.is_none());
        assert!(repo.get("p9").await.unwrap().is_none());
    }
}
