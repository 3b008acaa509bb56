//! Server configuration.
//!
//! Values come from an optional YAML file, then environment variables, then
//! command line flags, each layer overriding the previous one.

use abuse_guard::RateLimitConfig;
use anyhow::{Context, Result};
use api::ApiConfig;
use audit::AuditConfig;
use database::DatabaseConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ApiConfig,
    pub database: DatabaseConfig,
    pub rate_limits: RateLimitConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
    pub identity: IdentitySettings,
    /// Email granted the admin role when no role records exist yet
    pub bootstrap_admin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data").join("logs"),
            file_prefix: "clubhouse".to_string(),
        }
    }
}

/// Token settings. The signing key itself only comes from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub token_ttl_secs: Option<i64>,
}

/// Overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Read a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Load the file when given, then apply environment and flag overrides
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Apply `CLUBHOUSE_*` style environment variables through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CLUBHOUSE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CLUBHOUSE_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid CLUBHOUSE_PORT: {}", port))?;
        }
        if let Some(proxies) = lookup("CLUBHOUSE_TRUSTED_PROXIES") {
            self.server.trusted_proxies = proxies
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    p.parse()
                        .with_context(|| format!("Invalid CLUBHOUSE_TRUSTED_PROXIES entry: {}", p))
                })
                .collect::<Result<_>>()?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Some(email) = lookup("CLUBHOUSE_BOOTSTRAP_ADMIN") {
            self.bootstrap_admin = Some(email);
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(path) = &overrides.database_path {
            self.database.path = path.clone();
        }
        if let Some(dir) = &overrides.log_dir {
            self.logging.dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml(
            r#"
server:
  port: 8080
rate_limits:
  admin:
    max_attempts: 3
    window_ms: 1000
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.rate_limits.admin.max_attempts, 3);
        assert_eq!(config.rate_limits.login.max_attempts, 5);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = AppConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.server.port, 3030);
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_env_then_flags() {
        let env: HashMap<&str, &str> = [
            ("CLUBHOUSE_PORT", "4000"),
            ("DATABASE_PATH", "/tmp/env.db"),
            ("CLUBHOUSE_BOOTSTRAP_ADMIN", "root@x.com"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.bootstrap_admin.as_deref(), Some("root@x.com"));

        config.apply_overrides(&Overrides {
            port: Some(5000),
            ..Default::default()
        });
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/env.db"));
    }

    #[test]
    fn test_trusted_proxies_from_yaml_and_env() {
        let mut config = AppConfig::from_yaml(
            r#"
server:
  trusted_proxies: ["10.0.0.1"]
"#,
        )
        .unwrap();
        let proxy: std::net::IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(config.server.trusted_proxies, vec![proxy]);

        let env = |value: &'static str| {
            move |key: &str| (key == "CLUBHOUSE_TRUSTED_PROXIES").then(|| value.to_string())
        };
        config.apply_env(env("10.0.0.2, ::1")).unwrap();
        assert_eq!(config.server.trusted_proxies.len(), 2);
        assert!(config.apply_env(env("lb.internal")).is_err());
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_env(|key| (key == "CLUBHOUSE_PORT").then(|| "nope".to_string()))
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clubhouse.yaml");
        std::fs::write(&path, "bootstrap_admin: a@x.com\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.bootstrap_admin.as_deref(), Some("a@x.com"));
        assert!(AppConfig::from_file(&dir.path().join("missing.yaml")).is_err());
    }
}
