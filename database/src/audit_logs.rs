//! Durable audit trail.

use async_trait::async_trait;
use audit::{AuditEntry, AuditError, AuditPage, AuditQuery, AuditSink};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::{DatabaseError, Result};

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: SqlitePool,
}

impl AuditLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the entry with the same id
    pub async fn upsert(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, event_type, timestamp_ms, level, actor_email, risk_score, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                event_type = excluded.event_type,
                timestamp_ms = excluded.timestamp_ms,
                level = excluded.level,
                actor_email = excluded.actor_email,
                risk_score = excluded.risk_score,
                payload = excluded.payload",
        )
        .bind(&entry.id)
        .bind(entry.event_type.as_str())
        .bind(entry.timestamp.timestamp_millis())
        .bind(entry.level.as_str())
        .bind(&entry.actor_email)
        .bind(i64::from(entry.risk_score))
        .bind(serde_json::to_string(entry)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Read one page of entries, newest first.
    ///
    /// With `last_doc_id` the page starts right after that entry; otherwise
    /// `page` selects the page by offset.
    pub async fn query(&self, query: &AuditQuery) -> Result<AuditPage> {
        let page_size = query.effective_page_size();

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT payload, id FROM audit_logs WHERE 1 = 1");

        if let Some(event_type) = query.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.as_str());
        }
        if let Some(actor) = &query.actor_email {
            builder.push(" AND actor_email = ").push_bind(actor.clone());
        }
        if let Some(level) = query.level {
            builder.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(start) = query.start_date {
            builder
                .push(" AND timestamp_ms >= ")
                .push_bind(start.timestamp_millis());
        }
        if let Some(end) = query.end_date {
            builder
                .push(" AND timestamp_ms <= ")
                .push_bind(end.timestamp_millis());
        }
        if let Some(cursor) = &query.last_doc_id {
            let (cursor_ms,): (i64,) =
                sqlx::query_as("SELECT timestamp_ms FROM audit_logs WHERE id = ?")
                    .bind(cursor)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| {
                        DatabaseError::Validation(format!("unknown audit log cursor {}", cursor))
                    })?;
            builder
                .push(" AND (timestamp_ms < ")
                .push_bind(cursor_ms)
                .push(" OR (timestamp_ms = ")
                .push_bind(cursor_ms)
                .push(" AND id < ")
                .push_bind(cursor.clone())
                .push("))");
        }

        builder
            .push(" ORDER BY timestamp_ms DESC, id DESC LIMIT ")
            .push_bind(i64::from(page_size) + 1)
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset()));

        let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&self.pool).await?;

        let has_more = rows.len() > page_size as usize;
        let logs = rows
            .into_iter()
            .take(page_size as usize)
            .map(|(payload, _)| serde_json::from_str::<AuditEntry>(&payload))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let last_doc_id = if has_more {
            logs.last().map(|entry| entry.id.clone())
        } else {
            None
        };

        debug!("Audit log query returned {} entries (has_more={})", logs.len(), has_more);
        Ok(AuditPage {
            logs,
            page_size,
            has_more,
            last_doc_id,
        })
    }
}

#[async_trait]
impl AuditSink for AuditLogRepository {
    async fn write(&self, entry: &AuditEntry) -> audit::Result<()> {
        self.upsert(entry)
            .await
            .map_err(|e| AuditError::Sink(e.to_string()))
    }
}
