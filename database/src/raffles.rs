use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::announcements::insert_announcement;
use crate::models::{Announcement, Raffle, RaffleParticipant};
use crate::participants::insert_participant;
use crate::{DatabaseError, Result};

const COLUMNS: &str = "id, event_id, event_name, title, description, prize, start_date, end_date, \
    is_active, is_completed, participants, participant_posts, winner, winner_id, winner_name, \
    winner_post, completed_at, ended_at, is_announced, announcement_id, created_by, created_at, \
    updated_at";

/// Raffle documents.
///
/// State changes are field-scoped updates guarded by the state they start
/// from, so a writer holding an older copy of a raffle cannot undo a newer
/// change.
#[derive(Debug, Clone)]
pub struct RaffleRepository {
    pool: SqlitePool,
}

impl RaffleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, raffle: &Raffle) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_raffle(&mut conn, raffle).await
    }

    /// Insert a raffle together with its initial participant records.
    pub async fn insert_with_participants(
        &self,
        raffle: &Raffle,
        entries: &[RaffleParticipant],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_raffle(&mut tx, raffle).await?;
        for entry in entries {
            insert_participant(&mut tx, entry).await?;
        }
        tx.commit().await?;
        debug!(
            "Inserted raffle {} with {} participants",
            raffle.id,
            entries.len()
        );
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Raffle>> {
        let sql = format!("SELECT {} FROM raffles WHERE id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(raffle_from_row).transpose()
    }

    /// Raffles newest first, optionally limited to one event
    pub async fn list(&self, event_id: Option<&str>) -> Result<Vec<Raffle>> {
        let rows = match event_id {
            Some(event_id) => {
                let sql = format!(
                    "SELECT {} FROM raffles WHERE event_id = ? ORDER BY created_at DESC, id",
                    COLUMNS
                );
                sqlx::query(&sql).bind(event_id).fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!("SELECT {} FROM raffles ORDER BY created_at DESC, id", COLUMNS);
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter().map(raffle_from_row).collect()
    }

    /// Active raffles of an event that have not been drawn
    pub async fn list_open_for_event(&self, event_id: &str) -> Result<Vec<Raffle>> {
        let sql = format!(
            "SELECT {} FROM raffles WHERE event_id = ? AND is_active = 1 AND is_completed = 0",
            COLUMNS
        );
        let rows = sqlx::query(&sql).bind(event_id).fetch_all(&self.pool).await?;
        rows.iter().map(raffle_from_row).collect()
    }

    /// Record the drawn winner of a raffle that is not completed yet.
    ///
    /// Returns false when the raffle is missing or was already completed.
    pub async fn complete_draw(
        &self,
        raffle_id: &str,
        winner: &RaffleParticipant,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE raffles SET winner = ?, winner_id = ?, winner_name = ?, winner_post = ?,
                is_completed = 1, is_active = 0, completed_at = ?, updated_at = ?
             WHERE id = ? AND is_completed = 0",
        )
        .bind(&winner.user_id)
        .bind(&winner.id)
        .bind(&winner.user_name)
        .bind(&winner.post_id)
        .bind(at)
        .bind(at)
        .bind(raffle_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the winner, completing the raffle if it was still open.
    pub async fn assign_winner(
        &self,
        raffle_id: &str,
        winner: &RaffleParticipant,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE raffles SET winner = ?, winner_id = ?, winner_name = ?, winner_post = ?,
                is_completed = 1, is_active = 0, completed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&winner.user_id)
        .bind(&winner.id)
        .bind(&winner.user_name)
        .bind(&winner.post_id)
        .bind(at)
        .bind(at)
        .bind(raffle_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("raffle {}", raffle_id)));
        }
        Ok(())
    }

    /// Deactivate a raffle. Completion and winner fields are left alone.
    pub async fn mark_ended(&self, raffle_id: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE raffles SET is_active = 0, ended_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(at)
        .bind(at)
        .bind(raffle_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("raffle {}", raffle_id)));
        }
        Ok(())
    }

    /// Store the announcement and link it to a completed, unannounced raffle.
    ///
    /// Returns false, storing nothing, when the raffle is not in that state.
    pub async fn attach_announcement(
        &self,
        raffle_id: &str,
        announcement: &Announcement,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE raffles SET is_announced = 1, announcement_id = ?, updated_at = ?
             WHERE id = ? AND is_completed = 1 AND is_announced = 0",
        )
        .bind(&announcement.id)
        .bind(announcement.created_at)
        .bind(raffle_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        insert_announcement(&mut tx, announcement).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Add a participant record to an open raffle and append it to the
    /// raffle's participant lists.
    ///
    /// Returns false, storing nothing, when the raffle is missing, inactive,
    /// completed, or already holds an entry for the same post.
    pub async fn enroll(&self, entry: &RaffleParticipant, at: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE raffles
             SET participants = json_insert(participants, '$[#]', ?),
                 participant_posts = json_insert(participant_posts, '$[#]', ?),
                 updated_at = ?
             WHERE id = ? AND is_active = 1 AND is_completed = 0
               AND NOT EXISTS (
                   SELECT 1 FROM raffle_participants WHERE raffle_id = ? AND post_id = ?
               )",
        )
        .bind(&entry.user_id)
        .bind(&entry.post_id)
        .bind(at)
        .bind(&entry.raffle_id)
        .bind(&entry.raffle_id)
        .bind(&entry.post_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        insert_participant(&mut tx, entry).await?;
        tx.commit().await?;
        debug!("Enrolled post {} in raffle {}", entry.post_id, entry.raffle_id);
        Ok(true)
    }

    /// Delete a raffle document. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM raffles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn insert_raffle(conn: &mut SqliteConnection, raffle: &Raffle) -> Result<()> {
    let sql = format!(
        "INSERT INTO raffles ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        COLUMNS
    );
    sqlx::query(&sql)
        .bind(&raffle.id)
        .bind(&raffle.event_id)
        .bind(&raffle.event_name)
        .bind(&raffle.title)
        .bind(&raffle.description)
        .bind(&raffle.prize)
        .bind(raffle.start_date)
        .bind(raffle.end_date)
        .bind(raffle.is_active)
        .bind(raffle.is_completed)
        .bind(serde_json::to_string(&raffle.participants)?)
        .bind(serde_json::to_string(&raffle.participant_posts)?)
        .bind(&raffle.winner)
        .bind(&raffle.winner_id)
        .bind(&raffle.winner_name)
        .bind(&raffle.winner_post)
        .bind(raffle.completed_at)
        .bind(raffle.ended_at)
        .bind(raffle.is_announced)
        .bind(&raffle.announcement_id)
        .bind(&raffle.created_by)
        .bind(raffle.created_at)
        .bind(raffle.updated_at)
        .execute(&mut *conn)
        .await?;
    debug!("Inserted raffle {}", raffle.id);
    Ok(())
}

fn raffle_from_row(row: &SqliteRow) -> Result<Raffle> {
    let participants: String = row.try_get("participants")?;
    let participant_posts: String = row.try_get("participant_posts")?;

    Ok(Raffle {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        event_name: row.try_get("event_name")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        prize: row.try_get("prize")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        is_active: row.try_get("is_active")?,
        is_completed: row.try_get("is_completed")?,
        participants: serde_json::from_str(&participants)?,
        participant_posts: serde_json::from_str(&participant_posts)?,
        winner: row.try_get("winner")?,
        winner_id: row.try_get("winner_id")?,
        winner_name: row.try_get("winner_name")?,
        winner_post: row.try_get("winner_post")?,
        completed_at: row.try_get("completed_at")?,
        ended_at: row.try_get("ended_at")?,
        is_announced: row.try_get("is_announced")?,
        announcement_id: row.try_get("announcement_id")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;

    fn sample(id: &str, event_id: &str) -> Raffle {
        let now = Utc::now();
        Raffle {
            id: id.into(),
            event_id: event_id.into(),
            event_name: "Meetup".into(),
            title: "Door prize".into(),
            description: "One lucky poster".into(),
            prize: "Mug".into(),
            start_date: Some(now - Duration::days(1)),
            end_date: None,
            is_active: true,
            is_completed: false,
            participants: vec!["u1".into(), "u1".into()],
            participant_posts: vec!["p1".into(), "p2".into()],
            winner: None,
            winner_id: None,
            winner_name: None,
            winner_post: None,
            completed_at: None,
            ended_at: None,
            is_announced: false,
            announcement_id: None,
            created_by: Some("a@x.com".into()),
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(id: &str, raffle_id: &str, user_id: &str, post_id: &str) -> RaffleParticipant {
        RaffleParticipant {
            id: id.into(),
            raffle_id: raffle_id.into(),
            user_id: user_id.into(),
            user_name: Some(format!("User {}", user_id)),
            post_id: post_id.into(),
            participated_at: Utc::now(),
        }
    }

    fn announcement(id: &str, raffle_id: &str) -> Announcement {
        Announcement {
            id: id.into(),
            title: "Raffle winner: Door prize".into(),
            content: "Congrats".into(),
            raffle_id: Some(raffle_id.into()),
            event_id: Some("E1".into()),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_get_and_draw_once() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.raffles();
        repo.insert(&sample("r1", "E1")).await.unwrap();

        let stored = repo.get("r1").await.unwrap().unwrap();
        assert_eq!(stored.participants, vec!["u1", "u1"]);
        assert_eq!(stored.participant_posts, vec!["p1", "p2"]);
        assert!(stored.is_active);

        let first = entry("e1", "r1", "u1", "p1");
        assert!(repo.complete_draw("r1", &first, Utc::now()).await.unwrap());
        let second = entry("e2", "r1", "u2", "p3");
        assert!(!repo.complete_draw("r1", &second, Utc::now()).await.unwrap());
        assert!(!repo.complete_draw("ghost", &second, Utc::now()).await.unwrap());

        let stored = repo.get("r1").await.unwrap().unwrap();
        assert!(stored.is_completed);
        assert!(!stored.is_active);
        assert_eq!(stored.winner.as_deref(), Some("u1"));
        assert_eq!(stored.winner_id.as_deref(), Some("e1"));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_insert_with_participants_is_all_or_nothing() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.raffles();
        let entries = vec![entry("e1", "r1", "u1", "p1"), entry("e2", "r1", "u1", "p2")];
        repo.insert_with_participants(&sample("r1", "E1"), &entries)
            .await
            .unwrap();
        assert_eq!(db.participants().list_for_raffle("r1").await.unwrap().len(), 2);

        // the second entry reuses a primary key, so nothing of r2 is stored
        let clashing = vec![entry("e3", "r2", "u1", "p1"), entry("e1", "r2", "u1", "p2")];
        assert!(repo
            .insert_with_participants(&sample("r2", "E1"), &clashing)
            .await
            .is_err());
        assert!(repo.get("r2").await.unwrap().is_none());
        assert!(db.participants().list_for_raffle("r2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enroll_only_into_open_raffles() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.raffles();
        repo.insert(&sample("r1", "E1")).await.unwrap();

        assert!(repo.enroll(&entry("e3", "r1", "u2", "p3"), Utc::now()).await.unwrap());
        // same post again
        assert!(!repo.enroll(&entry("e4", "r1", "u2", "p3"), Utc::now()).await.unwrap());

        let stored = repo.get("r1").await.unwrap().unwrap();
        assert_eq!(stored.participants, vec!["u1", "u1", "u2"]);
        assert_eq!(stored.participant_posts, vec!["p1", "p2", "p3"]);

        repo.complete_draw("r1", &entry("e3", "r1", "u2", "p3"), Utc::now())
            .await
            .unwrap();
        assert!(!repo.enroll(&entry("e5", "r1", "u3", "p5"), Utc::now()).await.unwrap());
        assert!(!repo.enroll(&entry("e6", "ghost", "u3", "p5"), Utc::now()).await.unwrap());

        let stored = repo.get("r1").await.unwrap().unwrap();
        assert!(stored.is_completed);
        assert_eq!(stored.participants.len(), 3);
        assert_eq!(db.participants().list_for_raffle("r1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_end_keeps_winner_and_announce_once() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.raffles();
        repo.insert(&sample("r1", "E1")).await.unwrap();

        // not drawn yet
        assert!(!repo.attach_announcement("r1", &announcement("an0", "r1")).await.unwrap());
        assert_eq!(db.announcements().count().await.unwrap(), 0);

        repo.assign_winner("r1", &entry("e1", "r1", "u1", "p1"), Utc::now())
            .await
            .unwrap();
        repo.mark_ended("r1", Utc::now()).await.unwrap();
        let stored = repo.get("r1").await.unwrap().unwrap();
        assert!(stored.ended_at.is_some());
        assert_eq!(stored.winner.as_deref(), Some("u1"));

        assert!(repo.attach_announcement("r1", &announcement("an1", "r1")).await.unwrap());
        assert!(!repo.attach_announcement("r1", &announcement("an2", "r1")).await.unwrap());
        assert_eq!(db.announcements().count().await.unwrap(), 1);
        let stored = repo.get("r1").await.unwrap().unwrap();
        assert!(stored.is_announced);
        assert_eq!(stored.announcement_id.as_deref(), Some("an1"));
    }

    #[tokio::test]
    async fn test_list_and_open_filter() {
        let repo = Database::in_memory().await.unwrap().raffles();
        repo.insert(&sample("r1", "E1")).await.unwrap();
        repo.insert(&sample("r2", "E2")).await.unwrap();
        let mut done = sample("r3", "E1");
        done.is_completed = true;
        done.is_active = false;
        repo.insert(&done).await.unwrap();

        assert_eq!(repo.list(None).await.unwrap().len(), 3);
        assert_eq!(repo.list(Some("E1")).await.unwrap().len(), 2);

        let open = repo.list_open_for_event("E1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "r1");
    }

    #[tokio::test]
    async fn test_updates_on_missing_raffle() {
        let repo = Database::in_memory().await.unwrap().raffles();
        let err = repo
            .assign_winner("ghost", &entry("e1", "ghost", "u1", "p1"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
        assert!(matches!(
            repo.mark_ended("ghost", Utc::now()).await.unwrap_err(),
            DatabaseError::NotFound(_)
        ));
        assert!(!repo.delete("ghost").await.unwrap());
    }
}
