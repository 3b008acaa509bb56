use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("No bearer token provided")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IdentityError {
    /// Whether the failure lies with the credential rather than the provider.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            IdentityError::MissingToken | IdentityError::InvalidToken(_) | IdentityError::Expired
        )
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
