//! Bearer token issuing and verification.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use tracing::debug;

use crate::config::IdentityConfig;
use crate::error::{IdentityError, Result};

type HmacSha256 = Hmac<Sha256>;

/// The identity a valid bearer token resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub email: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Verifies opaque bearer tokens against an identity provider.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolve `token` to an identity, or fail with
    /// [`IdentityError::InvalidToken`] / [`IdentityError::Expired`].
    /// Provider outages surface as [`IdentityError::Unavailable`].
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issues and verifies HMAC-SHA256 signed tokens.
///
/// Token layout: `base64url(claims json) "." hex(hmac(claims part))`.
pub struct HmacTokenVerifier {
    config: IdentityConfig,
}

impl HmacTokenVerifier {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret_key)
            .map_err(|e| IdentityError::Configuration(format!("Invalid signing key: {}", e)))
    }

    /// Issue a token for `email` valid for the configured lifetime.
    pub fn issue(&self, email: &str) -> Result<String> {
        self.issue_at(email, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, email: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: email.trim().to_lowercase(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.config.token_ttl_secs,
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        debug!("Issued token for {}", claims.sub);
        Ok(format!("{}.{}", payload, signature))
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedIdentity> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| IdentityError::InvalidToken("malformed token".to_string()))?;

        let signature = hex::decode(signature)
            .map_err(|_| IdentityError::InvalidToken("malformed signature".to_string()))?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| IdentityError::InvalidToken("signature mismatch".to_string()))?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| IdentityError::InvalidToken("malformed payload".to_string()))?;
        let claims: Claims = serde_json::from_slice(&raw)
            .map_err(|_| IdentityError::InvalidToken("malformed claims".to_string()))?;

        if now.timestamp() >= claims.exp {
            return Err(IdentityError::Expired);
        }
        if claims.sub.is_empty() {
            return Err(IdentityError::InvalidToken("missing subject".to_string()));
        }

        Ok(VerifiedIdentity {
            email: claims.sub,
            expires_at: Utc.timestamp_opt(claims.exp, 0).single(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for HmacTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        self.verify_at(token, Utc::now())
    }
}

/// Maps fixed tokens to identities. For tests and local tooling.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, email: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), email.into());
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        self.tokens
            .get(token)
            .map(|email| VerifiedIdentity {
                email: email.clone(),
                expires_at: None,
            })
            .ok_or_else(|| IdentityError::InvalidToken("unknown token".to_string()))
    }
}
