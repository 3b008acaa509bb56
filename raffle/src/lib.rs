//! Raffles held for club events.
//!
//! Participants are derived from social posts: every post tagged with the
//! raffle's event inside its posting window is one entry. Entries are not
//! de-duplicated per user, so a user's odds grow with their number of
//! qualifying posts.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::RaffleEngine;
pub use error::{RaffleError, Result};
pub use types::{
    Actor, CreatedRaffle, DeletedRaffle, NewRaffle, RaffleScopeStats, RaffleStats,
};
