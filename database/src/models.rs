//! Records stored in the club database.

use authz::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Role record of one identity in the `admins` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    pub email: String,
    /// Raw stored role; `None` on records written before roles existed
    pub role: Option<String>,
    pub added_by: Option<String>,
    pub added_at: DateTime<Utc>,
    pub active: Option<bool>,
}

impl AdminRecord {
    /// The effective role, applying the legacy fallback for records without one.
    pub fn resolved_role(&self) -> Option<Role> {
        Role::from_record(self.role.as_deref())
    }
}

/// A raffle held for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Raffle {
    pub id: String,
    pub event_id: String,
    pub event_name: String,
    pub title: String,
    pub description: String,
    pub prize: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_completed: bool,
    /// User id of every participant record, duplicates included
    pub participants: Vec<String>,
    /// Post id of every participant record, parallel to `participants`
    pub participant_posts: Vec<String>,
    /// Winning user id
    pub winner: Option<String>,
    /// Winning participant record id
    pub winner_id: Option<String>,
    pub winner_name: Option<String>,
    pub winner_post: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_announced: bool,
    pub announcement_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Raffle {
    /// Whether `post` counts as an entry for this raffle.
    ///
    /// The post must be tagged with the raffle's event and, when the raffle
    /// has a posting window, be created inside it (bounds inclusive).
    pub fn accepts_post(&self, post: &Post) -> bool {
        if post.event_id.as_deref() != Some(self.event_id.as_str()) {
            return false;
        }
        if matches!(self.start_date, Some(start) if post.created_at < start) {
            return false;
        }
        if matches!(self.end_date, Some(end) if post.created_at > end) {
            return false;
        }
        true
    }
}

/// One entry of a raffle, derived from one qualifying post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaffleParticipant {
    pub id: String,
    pub raffle_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub post_id: String,
    pub participated_at: DateTime<Utc>,
}

/// A social post, optionally tagged with an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub event_id: Option<String>,
    pub user_id: String,
    pub user_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub raffle_id: Option<String>,
    pub event_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn raffle(start: Option<i64>, end: Option<i64>) -> Raffle {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Raffle {
            id: "r1".into(),
            event_id: "E1".into(),
            event_name: "Summer Meetup".into(),
            title: "Summer raffle".into(),
            description: String::new(),
            prize: "T-shirt".into(),
            start_date: start.map(|h| base + Duration::hours(h)),
            end_date: end.map(|h| base + Duration::hours(h)),
            is_active: true,
            is_completed: false,
            participants: vec![],
            participant_posts: vec![],
            winner: None,
            winner_id: None,
            winner_name: None,
            winner_post: None,
            completed_at: None,
            ended_at: None,
            is_announced: false,
            announcement_id: None,
            created_by: None,
            created_at: base,
            updated_at: base,
        }
    }

    fn post(event_id: Option<&str>, hours: i64) -> Post {
        Post {
            id: "p1".into(),
            event_id: event_id.map(str::to_string),
            user_id: "u1".into(),
            user_name: None,
            content: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::hours(hours),
        }
    }

    #[rstest]
    #[case(None, None, Some("E1"), 100, true)]
    #[case(None, None, Some("E2"), 0, false)]
    #[case(None, None, None, 0, false)]
    #[case(Some(0), Some(2), Some("E1"), 0, true)]
    #[case(Some(0), Some(2), Some("E1"), 2, true)]
    #[case(Some(0), Some(2), Some("E1"), -1, false)]
    #[case(Some(0), Some(2), Some("E1"), 3, false)]
    #[case(Some(0), None, Some("E1"), 500, true)]
    fn test_accepts_post(
        #[case] start: Option<i64>,
        #[case] end: Option<i64>,
        #[case] event: Option<&str>,
        #[case] at: i64,
        #[case] expected: bool,
    ) {
        assert_eq!(raffle(start, end).accepts_post(&post(event, at)), expected);
    }

    #[rstest]
    #[case(Some("admin"), Some(Role::Admin))]
    #[case(Some("event_manager"), Some(Role::EventManager))]
    #[case(None, Some(Role::Admin))]
    #[case(Some("superuser"), None)]
    fn test_resolved_role(#[case] stored: Option<&str>, #[case] expected: Option<Role>) {
        let record = AdminRecord {
            email: "a@x.com".into(),
            role: stored.map(str::to_string),
            added_by: None,
            added_at: Utc::now(),
            active: None,
        };
        assert_eq!(record.resolved_role(), expected);
    }
}
