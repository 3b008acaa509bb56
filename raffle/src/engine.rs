use audit::{AuditEventType, AuditLogger};
use chrono::Utc;
use database::{Announcement, Database, Post, Raffle, RaffleParticipant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{RaffleError, Result};
use crate::types::{
    Actor, CreatedRaffle, DeletedRaffle, NewRaffle, RaffleScopeStats, RaffleStats,
};

/// Raffle lifecycle: enrollment, draw, winner override, end, announce, delete.
///
/// Every state change is recorded in the audit trail. Writes only touch the
/// fields they change and are conditioned on the raffle's current state, so
/// of two concurrent draws exactly one wins and a late enrollment never
/// reopens a drawn raffle.
pub struct RaffleEngine {
    db: Database,
    audit: Arc<AuditLogger>,
    rng: Mutex<StdRng>,
}

impl RaffleEngine {
    pub fn new(db: Database, audit: Arc<AuditLogger>) -> Self {
        Self::with_rng(db, audit, StdRng::from_entropy())
    }

    /// Use a specific random source for draws.
    pub fn with_rng(db: Database, audit: Arc<AuditLogger>, rng: StdRng) -> Self {
        Self {
            db,
            audit,
            rng: Mutex::new(rng),
        }
    }

    /// Create a raffle and enroll every existing qualifying post of its event.
    pub async fn create_raffle(&self, input: NewRaffle, actor: &Actor) -> Result<CreatedRaffle> {
        input.validate()?;

        let now = Utc::now();
        let mut raffle = Raffle {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: input.event_id.trim().to_string(),
            event_name: input.event_name,
            title: input.title.trim().to_string(),
            description: input.description,
            prize: input.prize,
            start_date: input.start_date,
            end_date: input.end_date,
            is_active: true,
            is_completed: false,
            participants: Vec::new(),
            participant_posts: Vec::new(),
            winner: None,
            winner_id: None,
            winner_name: None,
            winner_post: None,
            completed_at: None,
            ended_at: None,
            is_announced: false,
            announcement_id: None,
            created_by: Some(actor.email.clone()),
            created_at: now,
            updated_at: now,
        };

        let entries: Vec<RaffleParticipant> = self
            .db
            .posts()
            .list_for_event(&raffle.event_id)
            .await?
            .iter()
            .filter(|post| raffle.accepts_post(post))
            .map(|post| participant_for(&raffle.id, post))
            .collect();

        for entry in &entries {
            raffle.participants.push(entry.user_id.clone());
            raffle.participant_posts.push(entry.post_id.clone());
        }

        self.db
            .raffles()
            .insert_with_participants(&raffle, &entries)
            .await?;

        info!(
            "Created raffle {} for event {} with {} participants",
            raffle.id,
            raffle.event_id,
            entries.len()
        );
        self.audit
            .log(
                AuditEventType::RaffleCreated,
                actor
                    .audit_details()
                    .with_target_id(raffle.id.clone(), "raffle")
                    .with_action("create_raffle")
                    .with_resource("/admin/raffles")
                    .with_metadata(json!({
                        "eventId": raffle.event_id,
                        "title": raffle.title,
                        "participantCount": entries.len(),
                    })),
            )
            .await;

        Ok(CreatedRaffle {
            id: raffle.id,
            participants: entries.len(),
        })
    }

    /// Pick a winner uniformly over all participant records.
    ///
    /// A user with several qualifying posts holds several records and so
    /// has proportionally higher odds.
    pub async fn draw_winner(&self, raffle_id: &str, actor: &Actor) -> Result<Raffle> {
        let raffle = self.load(raffle_id).await?;
        if raffle.is_completed {
            return Err(RaffleError::AlreadyCompleted(raffle_id.to_string()));
        }

        let participants = self.db.participants().list_for_raffle(raffle_id).await?;
        let winner = self
            .pick(&participants)
            .ok_or_else(|| RaffleError::NoParticipants(raffle_id.to_string()))?;

        if !self
            .db
            .raffles()
            .complete_draw(raffle_id, winner, Utc::now())
            .await?
        {
            self.load(raffle_id).await?;
            debug!("Raffle {} was completed by a concurrent draw", raffle_id);
            return Err(RaffleError::AlreadyCompleted(raffle_id.to_string()));
        }
        let raffle = self.load(raffle_id).await?;

        info!(
            "Drew winner {} for raffle {} out of {} entries",
            winner.user_id,
            raffle_id,
            participants.len()
        );
        self.audit
            .log(
                AuditEventType::RaffleDrawn,
                actor
                    .audit_details()
                    .with_target_id(raffle_id, "raffle")
                    .with_action("draw_winner")
                    .with_change(None, Some(json!(winner.user_id)))
                    .with_metadata(json!({
                        "participantCount": participants.len(),
                        "winnerPost": winner.post_id,
                    })),
            )
            .await;

        Ok(raffle)
    }

    /// Replace the winner with another participant.
    ///
    /// `new_winner` may name a participant record id or a user id. The raffle
    /// does not have to be drawn yet; afterwards it is completed and inactive.
    pub async fn change_winner(
        &self,
        raffle_id: &str,
        new_winner: &str,
        actor: &Actor,
    ) -> Result<Raffle> {
        let raffle = self.load(raffle_id).await?;

        let participants = self.db.participants().list_for_raffle(raffle_id).await?;
        let winner = participants
            .iter()
            .find(|p| p.id == new_winner)
            .or_else(|| participants.iter().find(|p| p.user_id == new_winner))
            .ok_or_else(|| RaffleError::NotAParticipant {
                raffle_id: raffle_id.to_string(),
                participant: new_winner.to_string(),
            })?;

        let previous = raffle.winner;
        self.db
            .raffles()
            .assign_winner(raffle_id, winner, Utc::now())
            .await?;
        let raffle = self.load(raffle_id).await?;

        info!(
            "Changed winner of raffle {} from {:?} to {}",
            raffle_id, previous, winner.user_id
        );
        self.audit
            .log(
                AuditEventType::RaffleWinnerChanged,
                actor
                    .audit_details()
                    .with_target_id(raffle_id, "raffle")
                    .with_action("change_winner")
                    .with_change(previous.map(|p| json!(p)), Some(json!(winner.user_id))),
            )
            .await;

        Ok(raffle)
    }

    /// Deactivate a raffle without drawing.
    pub async fn end_raffle(&self, raffle_id: &str, actor: &Actor) -> Result<Raffle> {
        self.load(raffle_id).await?;
        self.db.raffles().mark_ended(raffle_id, Utc::now()).await?;
        let raffle = self.load(raffle_id).await?;

        info!("Ended raffle {}", raffle_id);
        self.audit
            .log(
                AuditEventType::RaffleEnded,
                actor
                    .audit_details()
                    .with_target_id(raffle_id, "raffle")
                    .with_action("end_raffle"),
            )
            .await;

        Ok(raffle)
    }

    /// Publish an announcement naming the winner.
    pub async fn announce_raffle_result(
        &self,
        raffle_id: &str,
        actor: &Actor,
    ) -> Result<Announcement> {
        let raffle = self.load(raffle_id).await?;
        let winner = match (&raffle.winner, raffle.is_completed) {
            (Some(winner), true) => winner.clone(),
            _ => return Err(RaffleError::NotReady(raffle_id.to_string())),
        };
        if raffle.is_announced {
            return Err(RaffleError::AlreadyAnnounced(raffle_id.to_string()));
        }

        let now = Utc::now();
        let winner_name = raffle.winner_name.clone().unwrap_or(winner);
        let announcement = Announcement {
            id: uuid::Uuid::new_v4().to_string(),
            title: format!("Raffle winner: {}", raffle.title),
            content: if raffle.prize.is_empty() {
                format!("Congratulations to {} for winning {}!", winner_name, raffle.title)
            } else {
                format!(
                    "Congratulations to {} for winning {} in {}!",
                    winner_name, raffle.prize, raffle.title
                )
            },
            raffle_id: Some(raffle.id.clone()),
            event_id: Some(raffle.event_id.clone()),
            created_by: Some(actor.email.clone()),
            created_at: now,
        };
        if !self
            .db
            .raffles()
            .attach_announcement(raffle_id, &announcement)
            .await?
        {
            let current = self.load(raffle_id).await?;
            return Err(if current.is_announced {
                RaffleError::AlreadyAnnounced(raffle_id.to_string())
            } else {
                RaffleError::NotReady(raffle_id.to_string())
            });
        }

        info!("Announced raffle {} as {}", raffle_id, announcement.id);
        self.audit
            .log(
                AuditEventType::RaffleAnnounced,
                actor
                    .audit_details()
                    .with_target_id(raffle_id, "raffle")
                    .with_action("announce_raffle_result")
                    .with_metadata(json!({ "announcementId": announcement.id })),
            )
            .await;

        Ok(announcement)
    }

    /// Delete a raffle with its participants and announcement.
    ///
    /// A failure to delete the announcement is logged and skipped.
    pub async fn delete_raffle(&self, raffle_id: &str, actor: &Actor) -> Result<DeletedRaffle> {
        let raffle = self.load(raffle_id).await?;

        let mut announcement_removed = false;
        if let Some(announcement_id) = &raffle.announcement_id {
            match self.db.announcements().delete(announcement_id).await {
                Ok(removed) => announcement_removed = removed,
                Err(e) => warn!(
                    "Failed to delete announcement {} of raffle {}: {}",
                    announcement_id, raffle_id, e
                ),
            }
        }

        let participants_removed = self.db.participants().delete_for_raffle(raffle_id).await?;
        self.db.raffles().delete(raffle_id).await?;

        info!(
            "Deleted raffle {} ({} participants)",
            raffle_id, participants_removed
        );
        self.audit
            .log(
                AuditEventType::RaffleDeleted,
                actor
                    .audit_details()
                    .with_target_id(raffle_id, "raffle")
                    .with_action("delete_raffle")
                    .with_change(serde_json::to_value(&raffle).ok(), None)
                    .with_metadata(json!({
                        "participantsRemoved": participants_removed,
                        "announcementRemoved": announcement_removed,
                    })),
            )
            .await;

        Ok(DeletedRaffle {
            id: raffle_id.to_string(),
            participants_removed,
            announcement_removed,
        })
    }

    /// Add a new post to every open raffle of its event that it qualifies for.
    ///
    /// Returns the ids of the raffles the post entered. A post already
    /// enrolled in a raffle is not enrolled again.
    pub async fn enroll_post(&self, post_id: &str, actor: &Actor) -> Result<Vec<String>> {
        let post = self
            .db
            .posts()
            .get(post_id)
            .await?
            .ok_or_else(|| RaffleError::NotFound(format!("post {}", post_id)))?;
        let Some(event_id) = post.event_id.as_deref() else {
            debug!("Post {} has no event; nothing to enroll", post_id);
            return Ok(Vec::new());
        };

        let raffles = self.db.raffles();
        let mut enrolled = Vec::new();
        for raffle in raffles.list_open_for_event(event_id).await? {
            if !raffle.accepts_post(&post) {
                continue;
            }
            // skipped when the post is already in, or the raffle closed meanwhile
            let entry = participant_for(&raffle.id, &post);
            if !raffles.enroll(&entry, Utc::now()).await? {
                continue;
            }

            self.audit
                .log(
                    AuditEventType::ParticipantEnrolled,
                    actor
                        .audit_details()
                        .with_target_id(raffle.id.clone(), "raffle")
                        .with_action("enroll_post")
                        .with_metadata(json!({ "postId": post.id, "userId": post.user_id })),
                )
                .await;
            enrolled.push(raffle.id);
        }

        info!("Post {} entered {} raffles", post_id, enrolled.len());
        Ok(enrolled)
    }

    pub async fn get_raffle(&self, raffle_id: &str) -> Result<Raffle> {
        self.load(raffle_id).await
    }

    pub async fn list_raffles(&self, event_id: Option<&str>) -> Result<Vec<Raffle>> {
        Ok(self.db.raffles().list(event_id).await?)
    }

    /// Participant records of a raffle. Empty for unknown raffles.
    pub async fn get_raffle_participants(&self, raffle_id: &str) -> Result<Vec<RaffleParticipant>> {
        Ok(self.db.participants().list_for_raffle(raffle_id).await?)
    }

    /// Aggregate raffle figures, optionally with the figures of one raffle.
    pub async fn get_raffle_stats(&self, raffle_id: Option<&str>) -> Result<RaffleStats> {
        let raffles = self.db.raffles().list(None).await?;
        let participants = self.db.participants().list_all().await?;

        let scoped = match raffle_id {
            Some(id) => {
                if !raffles.iter().any(|r| r.id == id) {
                    return Err(RaffleError::NotFound(id.to_string()));
                }
                let entries: Vec<_> = participants.iter().filter(|p| p.raffle_id == id).collect();
                Some(RaffleScopeStats {
                    raffle_id: id.to_string(),
                    participant_count: entries.len(),
                    unique_participant_count: entries
                        .iter()
                        .map(|p| p.user_id.as_str())
                        .collect::<HashSet<_>>()
                        .len(),
                })
            }
            None => None,
        };

        Ok(RaffleStats {
            total_raffles: raffles.len(),
            active_raffles: raffles.iter().filter(|r| r.is_active).count(),
            completed_raffles: raffles.iter().filter(|r| r.is_completed).count(),
            announced_raffles: raffles.iter().filter(|r| r.is_announced).count(),
            total_participants: participants.len(),
            unique_participants: participants
                .iter()
                .map(|p| p.user_id.as_str())
                .collect::<HashSet<_>>()
                .len(),
            raffle: scoped,
        })
    }

    async fn load(&self, raffle_id: &str) -> Result<Raffle> {
        self.db
            .raffles()
            .get(raffle_id)
            .await?
            .ok_or_else(|| RaffleError::NotFound(raffle_id.to_string()))
    }

    fn pick<'a>(&self, participants: &'a [RaffleParticipant]) -> Option<&'a RaffleParticipant> {
        if participants.is_empty() {
            return None;
        }
        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(0..participants.len())
        };
        participants.get(index)
    }
}

fn participant_for(raffle_id: &str, post: &Post) -> RaffleParticipant {
    RaffleParticipant {
        id: uuid::Uuid::new_v4().to_string(),
        raffle_id: raffle_id.to_string(),
        user_id: post.user_id.clone(),
        user_name: post.user_name.clone(),
        post_id: post.id.clone(),
        participated_at: post.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit::{AuditConfig, MemorySink};
    use chrono::{DateTime, Duration};

    struct Fixture {
        db: Database,
        sink: Arc<MemorySink>,
        audit: Arc<AuditLogger>,
        engine: RaffleEngine,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let sink = Arc::new(MemorySink::new());
        let audit = Arc::new(AuditLogger::new(sink.clone(), AuditConfig::default()));
        let engine = RaffleEngine::with_rng(db.clone(), audit.clone(), StdRng::seed_from_u64(7));
        Fixture {
            db,
            sink,
            audit,
            engine,
        }
    }

    fn admin() -> Actor {
        Actor::new("admin@club.org").with_role(Some(authz::Role::Admin))
    }

    async fn add_post(db: &Database, id: &str, event: &str, user: &str, at: DateTime<Utc>) {
        db.posts()
            .insert(&Post {
                id: id.into(),
                event_id: Some(event.into()),
                user_id: user.into(),
                user_name: Some(format!("Name {}", user)),
                content: "photo".into(),
                created_at: at,
            })
            .await
            .unwrap();
    }

    fn new_raffle(event: &str) -> NewRaffle {
        NewRaffle {
            event_id: event.into(),
            event_name: "Spring Fair".into(),
            title: "Fair raffle".into(),
            prize: "Gift card".into(),
            ..Default::default()
        }
    }

    /// Raffle for E1 with posts from u1, u1, u2 and one post of another event.
    async fn seeded_raffle(f: &Fixture) -> String {
        let now = Utc::now();
        add_post(&f.db, "p1", "E1", "u1", now).await;
        add_post(&f.db, "p2", "E1", "u1", now).await;
        add_post(&f.db, "p3", "E1", "u2", now).await;
        add_post(&f.db, "p4", "E2", "u3", now).await;
        f.engine
            .create_raffle(new_raffle("E1"), &admin())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_create_backfills_participants() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;

        let raffle = f.engine.get_raffle(&id).await.unwrap();
        assert_eq!(raffle.participants, vec!["u1", "u1", "u2"]);
        assert_eq!(raffle.participant_posts, vec!["p1", "p2", "p3"]);
        assert!(raffle.is_active);
        assert!(!raffle.is_completed);

        let stats = f.engine.get_raffle_stats(Some(&id)).await.unwrap();
        let scoped = stats.raffle.unwrap();
        assert_eq!(scoped.participant_count, 3);
        assert_eq!(scoped.unique_participant_count, 2);
    }

    #[tokio::test]
    async fn test_create_respects_posting_window() {
        let f = fixture().await;
        let start = Utc::now() - Duration::days(2);
        add_post(&f.db, "early", "E1", "u1", start - Duration::hours(1)).await;
        add_post(&f.db, "inside", "E1", "u2", start + Duration::hours(1)).await;

        let created = f
            .engine
            .create_raffle(
                NewRaffle {
                    start_date: Some(start),
                    end_date: Some(start + Duration::days(1)),
                    ..new_raffle("E1")
                },
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(created.participants, 1);
        let participants = f.engine.get_raffle_participants(&created.id).await.unwrap();
        assert_eq!(participants[0].post_id, "inside");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let f = fixture().await;
        let err = f
            .engine
            .create_raffle(NewRaffle::default(), &admin())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_draw_completes_and_is_exclusive() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;

        let drawn = f.engine.draw_winner(&id, &admin()).await.unwrap();
        assert!(drawn.is_completed);
        assert!(!drawn.is_active);
        let winner = drawn.winner.clone().unwrap();
        assert!(["u1", "u2"].contains(&winner.as_str()));
        assert!(drawn.completed_at.is_some());
        assert!(drawn.winner_post.is_some());

        let err = f.engine.draw_winner(&id, &admin()).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_COMPLETED");

        let stored = f.engine.get_raffle(&id).await.unwrap();
        assert_eq!(stored.winner, drawn.winner);
        assert_eq!(stored.winner_id, drawn.winner_id);
    }

    #[tokio::test]
    async fn test_draw_errors() {
        let f = fixture().await;
        let err = f.engine.draw_winner("missing", &admin()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let empty = f
            .engine
            .create_raffle(new_raffle("E9"), &admin())
            .await
            .unwrap();
        let err = f.engine.draw_winner(&empty.id, &admin()).await.unwrap_err();
        assert_eq!(err.code(), "NO_PARTICIPANTS");
        assert!(!f.engine.get_raffle(&empty.id).await.unwrap().is_completed);
    }

    #[tokio::test]
    async fn test_draw_odds_follow_entry_count() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;
        let participants = f.engine.get_raffle_participants(&id).await.unwrap();

        let draws = 6000;
        let u1_wins = (0..draws)
            .filter(|_| f.engine.pick(&participants).unwrap().user_id == "u1")
            .count();
        let ratio = u1_wins as f64 / draws as f64;
        assert!((ratio - 2.0 / 3.0).abs() < 0.03, "u1 won {ratio}");
    }

    #[tokio::test]
    async fn test_change_winner() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;

        let err = f.engine.change_winner(&id, "u9", &admin()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_A_PARTICIPANT");

        // works before any draw
        let changed = f.engine.change_winner(&id, "u2", &admin()).await.unwrap();
        assert_eq!(changed.winner.as_deref(), Some("u2"));
        assert_eq!(changed.winner_post.as_deref(), Some("p3"));
        assert!(changed.is_completed);
        assert!(!changed.is_active);

        let participants = f.engine.get_raffle_participants(&id).await.unwrap();
        let record = participants.iter().find(|p| p.post_id == "p2").unwrap();
        let again = f.engine.change_winner(&id, &record.id, &admin()).await.unwrap();
        assert_eq!(again.winner.as_deref(), Some("u1"));
        assert_eq!(again.winner_id.as_deref(), Some(record.id.as_str()));
        assert!(again.is_completed);
        assert!(!again.is_active);
        assert!(again.completed_at >= changed.completed_at);

        let err = f.engine.change_winner("missing", "u1", &admin()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_end_raffle_keeps_completion() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;

        let ended = f.engine.end_raffle(&id, &admin()).await.unwrap();
        assert!(!ended.is_active);
        assert!(!ended.is_completed);
        assert!(ended.ended_at.is_some());
        assert!(ended.winner.is_none());
    }

    #[tokio::test]
    async fn test_announce_requires_winner() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;

        let err = f
            .engine
            .announce_raffle_result(&id, &admin())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_READY");
        assert_eq!(f.db.announcements().count().await.unwrap(), 0);

        f.engine.draw_winner(&id, &admin()).await.unwrap();
        let announcement = f.engine.announce_raffle_result(&id, &admin()).await.unwrap();
        assert_eq!(announcement.raffle_id.as_deref(), Some(id.as_str()));
        assert!(announcement.content.contains("Gift card"));

        let raffle = f.engine.get_raffle(&id).await.unwrap();
        assert!(raffle.is_announced);
        assert_eq!(raffle.announcement_id.as_deref(), Some(announcement.id.as_str()));

        let err = f
            .engine
            .announce_raffle_result(&id, &admin())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_ANNOUNCED");
        assert_eq!(f.db.announcements().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;
        f.engine.draw_winner(&id, &admin()).await.unwrap();
        let announcement = f.engine.announce_raffle_result(&id, &admin()).await.unwrap();

        let deleted = f.engine.delete_raffle(&id, &admin()).await.unwrap();
        assert_eq!(deleted.participants_removed, 3);
        assert!(deleted.announcement_removed);

        assert!(f.engine.get_raffle_participants(&id).await.unwrap().is_empty());
        assert_eq!(f.engine.get_raffle(&id).await.unwrap_err().code(), "NOT_FOUND");
        assert!(f.db.announcements().get(&announcement.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_announcement() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;
        f.engine.draw_winner(&id, &admin()).await.unwrap();
        let announcement = f.engine.announce_raffle_result(&id, &admin()).await.unwrap();
        f.db.announcements().delete(&announcement.id).await.unwrap();

        let deleted = f.engine.delete_raffle(&id, &admin()).await.unwrap();
        assert!(!deleted.announcement_removed);
        assert!(f.db.raffles().get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enroll_post() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;
        let drawn = f
            .engine
            .create_raffle(new_raffle("E1"), &admin())
            .await
            .unwrap();
        f.engine.draw_winner(&drawn.id, &admin()).await.unwrap();

        add_post(&f.db, "p5", "E1", "u4", Utc::now()).await;
        let enrolled = f.engine.enroll_post("p5", &admin()).await.unwrap();
        assert_eq!(enrolled, vec![id.clone()]);

        let raffle = f.engine.get_raffle(&id).await.unwrap();
        assert_eq!(raffle.participants.last().map(String::as_str), Some("u4"));
        assert_eq!(raffle.participant_posts.len(), 4);

        // second enrollment of the same post is a no-op
        assert!(f.engine.enroll_post("p5", &admin()).await.unwrap().is_empty());
        assert_eq!(f.engine.get_raffle_participants(&id).await.unwrap().len(), 4);

        let err = f.engine.enroll_post("nope", &admin()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_enrollment_racing_a_draw_never_reopens_it() {
        let f = fixture().await;
        let engine = Arc::new(RaffleEngine::with_rng(
            f.db.clone(),
            f.audit.clone(),
            StdRng::seed_from_u64(11),
        ));
        let now = Utc::now();

        for round in 0..40 {
            let event = format!("E{}", round);
            add_post(&f.db, &format!("{}-a", event), &event, "u1", now).await;
            add_post(&f.db, &format!("{}-b", event), &event, "u2", now).await;
            let id = engine
                .create_raffle(new_raffle(&event), &admin())
                .await
                .unwrap()
                .id;
            let late_post = format!("{}-late", event);
            add_post(&f.db, &late_post, &event, "u3", now).await;

            let enroll = tokio::spawn({
                let engine = engine.clone();
                async move { engine.enroll_post(&late_post, &admin()).await }
            });
            let draw = tokio::spawn({
                let engine = engine.clone();
                let id = id.clone();
                async move { engine.draw_winner(&id, &admin()).await }
            });
            let enrolled = enroll.await.unwrap().unwrap();
            let drawn = draw.await.unwrap().unwrap();

            let stored = engine.get_raffle(&id).await.unwrap();
            assert!(stored.is_completed, "round {round}: draw was undone");
            assert!(!stored.is_active);
            assert_eq!(stored.winner, drawn.winner);
            assert_eq!(stored.winner_id, drawn.winner_id);

            // lists and records agree whichever side went first
            let records = engine.get_raffle_participants(&id).await.unwrap();
            assert_eq!(stored.participants.len(), records.len());
            assert_eq!(records.len(), 2 + enrolled.len());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_draws_pick_one_winner() {
        let f = fixture().await;
        let engine = Arc::new(RaffleEngine::with_rng(
            f.db.clone(),
            f.audit.clone(),
            StdRng::seed_from_u64(3),
        ));
        let now = Utc::now();

        for round in 0..40 {
            let event = format!("D{}", round);
            for (post, user) in [("a", "u1"), ("b", "u2"), ("c", "u3"), ("d", "u4")] {
                add_post(&f.db, &format!("{}-{}", event, post), &event, user, now).await;
            }
            let id = engine
                .create_raffle(new_raffle(&event), &admin())
                .await
                .unwrap()
                .id;

            let draws: Vec<_> = (0..2)
                .map(|_| {
                    let engine = engine.clone();
                    let id = id.clone();
                    tokio::spawn(async move { engine.draw_winner(&id, &admin()).await })
                })
                .collect();
            let mut won = Vec::new();
            for draw in draws {
                match draw.await.unwrap() {
                    Ok(raffle) => won.push(raffle),
                    Err(e) => assert_eq!(e.code(), "ALREADY_COMPLETED"),
                }
            }

            assert_eq!(won.len(), 1, "round {round}");
            let stored = engine.get_raffle(&id).await.unwrap();
            assert_eq!(stored.winner_id, won[0].winner_id);
        }
    }

    #[tokio::test]
    async fn test_global_stats_and_audit_trail() {
        let f = fixture().await;
        let id = seeded_raffle(&f).await;
        f.engine.draw_winner(&id, &admin()).await.unwrap();
        f.engine
            .create_raffle(new_raffle("E2"), &admin())
            .await
            .unwrap();

        let stats = f.engine.get_raffle_stats(None).await.unwrap();
        assert_eq!(stats.total_raffles, 2);
        assert_eq!(stats.active_raffles, 1);
        assert_eq!(stats.completed_raffles, 1);
        assert_eq!(stats.total_participants, 4);
        assert_eq!(stats.unique_participants, 3);
        assert!(stats.raffle.is_none());
        assert_eq!(
            f.engine.get_raffle_stats(Some("missing")).await.unwrap_err().code(),
            "NOT_FOUND"
        );

        f.audit.force_flush().await.unwrap();
        let events: Vec<_> = f.sink.entries().iter().map(|e| e.event_type).collect();
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == AuditEventType::RaffleCreated)
                .count(),
            2
        );
        assert!(events.contains(&AuditEventType::RaffleDrawn));
    }
}
