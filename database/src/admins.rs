use async_trait::async_trait;
use authz::{AuthzError, Role, RoleStore};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::models::AdminRecord;
use crate::{DatabaseError, Result};

/// Role records keyed by identity (email).
#[derive(Debug, Clone)]
pub struct AdminRepository {
    pool: SqlitePool,
}

impl AdminRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the role record of `email`
    pub async fn get(&self, email: &str) -> Result<Option<AdminRecord>> {
        let record = sqlx::query_as::<_, AdminRecord>(
            "SELECT email, role, added_by, added_at, active FROM admins WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// All role records, oldest first
    pub async fn list(&self) -> Result<Vec<AdminRecord>> {
        let records = sqlx::query_as::<_, AdminRecord>(
            "SELECT email, role, added_by, added_at, active FROM admins ORDER BY added_at, email",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Create a role record. Fails with [`DatabaseError::Duplicate`] when one exists.
    pub async fn insert(&self, email: &str, role: Role, added_by: Option<&str>) -> Result<AdminRecord> {
        let record = AdminRecord {
            email: email.to_string(),
            role: Some(role.as_str().to_string()),
            added_by: added_by.map(str::to_string),
            added_at: Utc::now(),
            active: Some(true),
        };
        self.insert_record(&record).await?;
        info!("Added role record for {} as {}", email, role);
        Ok(record)
    }

    /// Store a record as given, including legacy records without a role.
    pub async fn insert_record(&self, record: &AdminRecord) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO admins (email, role, added_by, added_at, active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(&record.email)
        .bind(&record.role)
        .bind(&record.added_by)
        .bind(record.added_at)
        .bind(record.active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::Duplicate(format!("admin {}", record.email)));
        }
        Ok(())
    }

    /// Change the role of an existing record. Returns the previous stored role.
    pub async fn update_role(&self, email: &str, role: Role) -> Result<Option<String>> {
        let existing = self
            .get(email)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("admin {}", email)))?;

        sqlx::query("UPDATE admins SET role = ? WHERE email = ?")
            .bind(role.as_str())
            .bind(email)
            .execute(&self.pool)
            .await?;

        info!("Changed role of {} to {}", email, role);
        Ok(existing.role)
    }

    /// Delete the role record of `email`. Returns whether a record existed.
    pub async fn delete(&self, email: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM admins WHERE email = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected() > 0;
        debug!("Delete admin {}: removed={}", email, removed);
        Ok(removed)
    }
}

#[async_trait]
impl RoleStore for AdminRepository {
    async fn get_role(&self, identity: &str) -> authz::Result<Option<Role>> {
        let record = self
            .get(identity)
            .await
            .map_err(|e| AuthzError::Store(e.to_string()))?;
        Ok(record.and_then(|record| record.resolved_role()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn repo() -> AdminRepository {
        Database::in_memory().await.unwrap().admins()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = repo().await;
        repo.insert("a@x.com", Role::Admin, Some("root@x.com"))
            .await
            .unwrap();

        let record = repo.get("a@x.com").await.unwrap().unwrap();
        assert_eq!(record.role.as_deref(), Some("admin"));
        assert_eq!(record.added_by.as_deref(), Some("root@x.com"));
        assert_eq!(record.active, Some(true));
        assert!(repo.get("missing@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let repo = repo().await;
        repo.insert("a@x.com", Role::Admin, None).await.unwrap();
        let err = repo.insert("a@x.com", Role::EventManager, None).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate(_)));

        let record = repo.get("a@x.com").await.unwrap().unwrap();
        assert_eq!(record.role.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repo().await;
        repo.insert("em@x.com", Role::EventManager, None).await.unwrap();

        let previous = repo.update_role("em@x.com", Role::Admin).await.unwrap();
        assert_eq!(previous.as_deref(), Some("event_manager"));
        assert_eq!(repo.get_role("em@x.com").await.unwrap(), Some(Role::Admin));

        assert!(repo.delete("em@x.com").await.unwrap());
        assert!(!repo.delete("em@x.com").await.unwrap());
        assert_eq!(repo.get_role("em@x.com").await.unwrap(), None);

        let err = repo.update_role("em@x.com", Role::Admin).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_role_store_legacy_and_unknown_records() {
        let repo = repo().await;
        let legacy = AdminRecord {
            email: "old@x.com".into(),
            role: None,
            added_by: None,
            added_at: Utc::now(),
            active: None,
        };
        repo.insert_record(&legacy).await.unwrap();
        repo.insert_record(&AdminRecord {
            email: "odd@x.com".into(),
            role: Some("superuser".into()),
            ..legacy.clone()
        })
        .await
        .unwrap();

        assert_eq!(repo.get_role("old@x.com").await.unwrap(), Some(Role::Admin));
        assert_eq!(repo.get_role("odd@x.com").await.unwrap(), None);
        assert_eq!(repo.get_role("nobody@x.com").await.unwrap(), None);
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }
}
