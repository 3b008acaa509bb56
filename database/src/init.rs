use crate::{Database, DatabaseError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Database initialization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub path: PathBuf,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// Whether to create tables on initialization
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data").join("clubhouse.db"),
            max_connections: 5,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration with default paths
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom database path
    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Set whether to create tables on initialization
    pub fn with_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

/// Initialize the database with the given configuration
pub async fn initialize_database(config: &DatabaseConfig) -> Result<Arc<Database>> {
    info!("Initializing database with configuration");

    let db_path_str = config
        .path
        .to_str()
        .ok_or_else(|| DatabaseError::Validation("Invalid database path".into()))?;

    let db = Database::connect(db_path_str, config.max_connections).await?;
    info!("Database connection established");

    if config.run_migrations {
        db.migrate().await?;
    }

    Ok(Arc::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = DatabaseConfig::new().with_database_path(db_path.clone());
        let db = initialize_database(&config).await.unwrap();

        assert!(db_path.exists());
        assert!(db.table_exists("raffles").await.unwrap());
    }

    #[tokio::test]
    async fn test_initialization_without_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new()
            .with_database_path(temp_dir.path().join("bare.db"))
            .with_migrations(false);

        let db = initialize_database(&config).await.unwrap();
        assert!(!db.table_exists("raffles").await.unwrap());
    }
}
