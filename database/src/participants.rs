use sqlx::{SqliteConnection, SqlitePool};

use crate::models::RaffleParticipant;
use crate::Result;

/// Participant records, one per qualifying post.
#[derive(Debug, Clone)]
pub struct ParticipantRepository {
    pool: SqlitePool,
}

impl ParticipantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, participant: &RaffleParticipant) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_participant(&mut conn, participant).await
    }

    /// Participants of a raffle in enrollment order
    pub async fn list_for_raffle(&self, raffle_id: &str) -> Result<Vec<RaffleParticipant>> {
        let participants = sqlx::query_as::<_, RaffleParticipant>(
            "SELECT id, raffle_id, user_id, user_name, post_id, participated_at
             FROM raffle_participants WHERE raffle_id = ? ORDER BY rowid",
        )
        .bind(raffle_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(participants)
    }

    /// Every participant record of every raffle
    pub async fn list_all(&self) -> Result<Vec<RaffleParticipant>> {
        let participants = sqlx::query_as::<_, RaffleParticipant>(
            "SELECT id, raffle_id, user_id, user_name, post_id, participated_at
             FROM raffle_participants ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(participants)
    }

    /// Delete all participants of a raffle. Returns the number removed.
    pub async fn delete_for_raffle(&self, raffle_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM raffle_participants WHERE raffle_id = ?")
            .bind(raffle_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

pub(crate) async fn insert_participant(
    conn: &mut SqliteConnection,
    participant: &RaffleParticipant,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO raffle_participants (id, raffle_id, user_id, user_name, post_id, participated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&participant.id)
    .bind(&participant.raffle_id)
    .bind(&participant.user_id)
    .bind(&participant.user_name)
    .bind(&participant.post_id)
    .bind(participant.participated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
