use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod admins;
pub mod announcements;
pub mod audit_logs;
pub mod error;
pub mod init;
pub mod models;
pub mod participants;
pub mod posts;
pub mod raffles;
mod schema;

pub use admins::AdminRepository;
pub use announcements::AnnouncementRepository;
pub use audit_logs::AuditLogRepository;
pub use error::{DatabaseError, Result};
pub use init::{initialize_database, DatabaseConfig};
pub use models::{AdminRecord, Announcement, Post, Raffle, RaffleParticipant};
pub use participants::ParticipantRepository;
pub use posts::PostRepository;
pub use raffles::RaffleRepository;

/// Database connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(database_path: &str) -> Result<Self> {
        Self::connect(database_path, 5).await
    }

    /// Connect to the database file at `database_path`, creating it when missing
    pub async fn connect(database_path: &str, max_connections: u32) -> Result<Self> {
        // Ensure the data directory exists
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Connecting to database at: {}", database_path);

        let connection_string = if database_path.starts_with("sqlite:") {
            database_path.to_string()
        } else if database_path.starts_with('/') {
            format!("sqlite://{}", database_path)
        } else {
            format!("sqlite:{}", database_path)
        };

        debug!("Using connection string: {}", connection_string);

        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        debug!("Database connection established");

        Ok(Self { pool })
    }

    /// A private in-memory database with the schema applied.
    ///
    /// The pool holds a single connection that never expires, since every
    /// new connection to `sqlite::memory:` would open an empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Create all tables and indexes that do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{}: {}", first_line(statement), e)))?;
        }
        info!("Database migrations completed");
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Check if a table exists
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        let query = r#"
            SELECT COUNT(*) as count
            FROM sqlite_master
            WHERE type='table' AND name=?
        "#;

        let result: (i32,) = sqlx::query_as(query)
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;

        Ok(result.0 > 0)
    }

    pub fn admins(&self) -> AdminRepository {
        AdminRepository::new(self.pool.clone())
    }

    pub fn raffles(&self) -> RaffleRepository {
        RaffleRepository::new(self.pool.clone())
    }

    pub fn participants(&self) -> ParticipantRepository {
        ParticipantRepository::new(self.pool.clone())
    }

    pub fn posts(&self) -> PostRepository {
        PostRepository::new(self.pool.clone())
    }

    pub fn announcements(&self) -> AnnouncementRepository {
        AnnouncementRepository::new(self.pool.clone())
    }

    pub fn audit_logs(&self) -> AuditLogRepository {
        AuditLogRepository::new(self.pool.clone())
    }
}

fn first_line(statement: &str) -> &str {
    statement.trim().lines().next().unwrap_or_default()
}

/// Generate an id for a new record
pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        assert!(db.pool().acquire().await.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_migrate_creates_collections() {
        let db = Database::in_memory().await.unwrap();

        for table in [
            "admins",
            "raffles",
            "raffle_participants",
            "posts",
            "announcements",
            "audit_logs",
        ] {
            assert!(db.table_exists(table).await.unwrap(), "missing {table}");
        }
        assert!(!db.table_exists("non_existent_table").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_is_repeatable() {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.ping().await.unwrap();
    }
}
