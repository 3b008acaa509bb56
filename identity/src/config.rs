//! Token signing configuration.

use std::env;
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use tracing::warn;

use crate::error::{IdentityError, Result};

/// Default token lifetime: one hour
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Signing key and token lifetime
#[derive(Clone)]
pub struct IdentityConfig {
    /// HMAC key, at least 32 bytes
    pub secret_key: Vec<u8>,
    /// Lifetime of issued tokens in seconds
    pub token_ttl_secs: i64,
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("secret_key", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl IdentityConfig {
    /// Create a configuration with an explicit key
    pub fn with_secret(secret_key: impl Into<Vec<u8>>) -> Result<Self> {
        let secret_key = secret_key.into();
        if secret_key.len() < 32 {
            return Err(IdentityError::Configuration(format!(
                "secret key must be at least 32 bytes, got {}",
                secret_key.len()
            )));
        }
        Ok(Self {
            secret_key,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        })
    }

    /// Set the token lifetime
    pub fn with_ttl(mut self, token_ttl_secs: i64) -> Self {
        self.token_ttl_secs = token_ttl_secs;
        self
    }

    /// Load the configuration from the environment.
    ///
    /// The key is read base64-encoded from `IDENTITY_SECRET_KEY`. In `dev`
    /// and `test` environments a missing key is replaced by a random one;
    /// in `prd` it is an error.
    pub fn from_env() -> Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let config = match Self::load_from_env() {
            Ok(config) => config,
            Err(e) if environment == "prd" => return Err(e),
            Err(e) => {
                warn!("{}. Using a random signing key; tokens will not survive a restart.", e);
                Self::random()
            }
        };

        let ttl = match env::var("IDENTITY_TOKEN_TTL_SECS") {
            Ok(raw) => raw.parse().map_err(|_| {
                IdentityError::Configuration(format!("Invalid IDENTITY_TOKEN_TTL_SECS: {}", raw))
            })?,
            Err(_) => DEFAULT_TOKEN_TTL_SECS,
        };
        Ok(config.with_ttl(ttl))
    }

    fn load_from_env() -> Result<Self> {
        let key_str = env::var("IDENTITY_SECRET_KEY")
            .map_err(|_| IdentityError::Configuration("IDENTITY_SECRET_KEY not set".to_string()))?;

        let key = BASE64.decode(key_str.trim().as_bytes()).map_err(|e| {
            IdentityError::Configuration(format!("Invalid BASE64 secret key: {}", e))
        })?;
        Self::with_secret(key)
    }

    /// A configuration with a freshly generated key
    pub fn random() -> Self {
        let mut secret_key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret_key);
        Self {
            secret_key,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}
