//! Error types for the authorization system.
//!
//! The permission policy itself is total and never fails; errors only come
//! from parsing role names and from the role store behind [`crate::RoleStore`].

use thiserror::Error;

/// Errors that can occur while resolving roles.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A role name that is not one of the known roles.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// The backing role store could not be read.
    #[error("Role store unavailable: {0}")]
    Store(String),
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::InvalidRole("root".to_string());
        assert_eq!(err.to_string(), "Invalid role: root");

        let err = AuthzError::Store("connection refused".to_string());
        assert_eq!(err.to_string(), "Role store unavailable: connection refused");
    }
}
