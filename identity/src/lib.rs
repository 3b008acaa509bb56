//! Credential verification boundary.
//!
//! Requests carry an opaque bearer token. An [`IdentityVerifier`] turns it
//! into a [`VerifiedIdentity`] (the caller's email) or rejects it. The
//! shipped [`HmacTokenVerifier`] signs its own tokens; an external identity
//! provider plugs in by implementing the trait.

pub mod config;
pub mod error;
pub mod token;

pub use config::IdentityConfig;
pub use error::{IdentityError, Result};
pub use token::{HmacTokenVerifier, IdentityVerifier, StaticTokenVerifier, VerifiedIdentity};

/// Extract the token from an `Authorization` header value.
///
/// Accepts `Bearer <token>` with any casing of the scheme. Returns `None`
/// when the header is not a bearer credential or the token is empty.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Bearer abc.def", Some("abc.def"))]
    #[case("bearer   xyz ", Some("xyz"))]
    #[case("Basic dXNlcjpwYXNz", None)]
    #[case("Bearer ", None)]
    #[case("Bearer", None)]
    #[case("", None)]
    fn test_bearer_token(#[case] header: &str, #[case] expected: Option<&str>) {
        assert_eq!(bearer_token(header), expected);
    }
}
