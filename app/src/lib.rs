//! Clubhouse server wiring: configuration, logging and the service lifecycle.

pub mod config;
pub mod logging;

use abuse_guard::AbuseGuard;
use anyhow::{Context, Result};
use api::AppState;
use audit::AuditLogger;
use authz::Role;
use database::{initialize_database, Database};
use identity::{HmacTokenVerifier, IdentityConfig};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use config::{AppConfig, LoggingConfig, Overrides};

/// Long-running services behind the HTTP surface
pub struct Services {
    pub db: Database,
    pub guard: Arc<AbuseGuard>,
    pub audit: Arc<AuditLogger>,
    pub verifier: Arc<HmacTokenVerifier>,
}

impl Services {
    /// Open the database and build every service from `config`.
    pub async fn build(config: &AppConfig, identity: IdentityConfig) -> Result<Self> {
        let db = initialize_database(&config.database)
            .await
            .context("Failed to initialize database")?;
        let db = Database::clone(&db);

        let guard = Arc::new(AbuseGuard::in_memory(config.rate_limits.clone()));
        let audit = Arc::new(AuditLogger::new(
            Arc::new(db.audit_logs()),
            config.audit.clone(),
        ));
        let verifier = Arc::new(HmacTokenVerifier::new(identity));

        Ok(Self {
            db,
            guard,
            audit,
            verifier,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.db.clone(),
            self.verifier.clone(),
            self.guard.clone(),
            self.audit.clone(),
        )
    }

    /// Start the audit flush task and the rate limit sweeper
    pub fn start(&self) {
        self.audit.start();
        self.guard.start_sweeper();
    }

    /// Stop the background tasks and write out queued audit entries
    pub async fn shutdown(&self) {
        self.guard.stop().await;
        match self.audit.shutdown().await {
            Ok(written) => info!("Flushed {} audit entries on shutdown", written),
            Err(e) => error!("Audit entries lost on shutdown: {}", e),
        }
    }
}

/// Grant `email` the admin role when no role records exist yet.
///
/// Returns whether a record was created.
pub async fn bootstrap_admin(db: &Database, email: &str) -> Result<bool> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Ok(false);
    }
    if !db.admins().list().await?.is_empty() {
        return Ok(false);
    }
    db.admins().insert(&email, Role::Admin, None).await?;
    warn!("Bootstrapped {} as the first admin", email);
    Ok(true)
}

/// Run the server until `shutdown` resolves.
pub async fn run<F>(config: AppConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let services = Services::build(&config, identity_config(&config)?).await?;

    if let Some(email) = &config.bootstrap_admin {
        bootstrap_admin(&services.db, email).await?;
    }

    services.start();
    let served =
        api::start_server_with_config(services.app_state(), config.server.clone(), shutdown).await;
    services.shutdown().await;

    served.context("API server failed")
}

/// Signing key from the environment, token lifetime from the file when set
pub fn identity_config(config: &AppConfig) -> Result<IdentityConfig> {
    let identity = IdentityConfig::from_env().context("Invalid identity configuration")?;
    Ok(match config.identity.token_ttl_secs {
        Some(ttl) => identity.with_ttl(ttl),
        None => identity,
    })
}

/// Sign a token for `email` with the configured key.
pub fn issue_token(config: &AppConfig, email: &str) -> Result<String> {
    Ok(HmacTokenVerifier::new(identity_config(config)?).issue(email)?)
}
