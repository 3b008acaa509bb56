use sqlx::{SqliteConnection, SqlitePool};

use crate::models::Announcement;
use crate::Result;

#[derive(Debug, Clone)]
pub struct AnnouncementRepository {
    pool: SqlitePool,
}

impl AnnouncementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, announcement: &Announcement) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_announcement(&mut conn, announcement).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Announcement>> {
        let announcement = sqlx::query_as::<_, Announcement>(
            "SELECT id, title, content, raffle_id, event_id, created_by, created_at
             FROM announcements WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(announcement)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM announcements WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of stored announcements
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM announcements")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub(crate) async fn insert_announcement(
    conn: &mut SqliteConnection,
    announcement: &Announcement,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO announcements (id, title, content, raffle_id, event_id, created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&announcement.id)
    .bind(&announcement.title)
    .bind(&announcement.content)
    .bind(&announcement.raffle_id)
    .bind(&announcement.event_id)
    .bind(&announcement.created_by)
    .bind(announcement.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Utc;

    #[tokio::test]
    async fn test_insert_get_delete() {
        let repo = Database::in_memory().await.unwrap().announcements();
        repo.insert(&Announcement {
            id: "an1".into(),
            title: "Winner".into(),
            content: "Congrats".into(),
            raffle_id: Some("r1".into()),
            event_id: Some("E1".into()),
            created_by: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(
            repo.get("an1").await.unwrap().unwrap().raffle_id.as_deref(),
            Some("r1")
        );
        assert!(repo.delete("an1").await.unwrap());
        assert!(repo.get("an1").await.unwrap().is_none());
    }
}
