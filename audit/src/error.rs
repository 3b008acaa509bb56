use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit sink error: {0}")]
    Sink(String),

    #[error("Audit flush failed for {failed} of {batch} entries: {reason}")]
    Flush {
        failed: usize,
        batch: usize,
        reason: String,
    },

    #[error("Unknown audit event type: {0}")]
    UnknownEventType(String),

    #[error("Unknown audit level: {0}")]
    UnknownLevel(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
