use database::DatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaffleError {
    #[error("Raffle not found: {0}")]
    NotFound(String),

    #[error("Raffle {0} already has a winner")]
    AlreadyCompleted(String),

    #[error("Raffle {0} has no participants")]
    NoParticipants(String),

    #[error("{participant} is not a participant of raffle {raffle_id}")]
    NotAParticipant {
        raffle_id: String,
        participant: String,
    },

    #[error("Raffle {0} must be completed with a winner before it can be announced")]
    NotReady(String),

    #[error("Raffle {0} has already been announced")]
    AlreadyAnnounced(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl RaffleError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RaffleError::NotFound(_) => "NOT_FOUND",
            RaffleError::AlreadyCompleted(_) => "ALREADY_COMPLETED",
            RaffleError::NoParticipants(_) => "NO_PARTICIPANTS",
            RaffleError::NotAParticipant { .. } => "NOT_A_PARTICIPANT",
            RaffleError::NotReady(_) => "NOT_READY",
            RaffleError::AlreadyAnnounced(_) => "ALREADY_ANNOUNCED",
            RaffleError::Validation(_) => "VALIDATION_ERROR",
            RaffleError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RaffleError>;
