//! Audit trail storage (append-only).

use ehrbridge_storage::AuditTrailEntry;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, PgResult};

type AuditTuple = (
    Uuid,
    String,
    String,
    String,
    Option<String>,
    serde_json::Value,
    OffsetDateTime,
);

fn entry_from_tuple(row: AuditTuple) -> AuditTrailEntry {
    AuditTrailEntry {
        id: row.0,
        user_id: row.1,
        action: row.2,
        resource_type: row.3,
        resource_id: row.4,
        details: row.5,
        timestamp: row.6,
    }
}

/// Audit trail storage operations.
pub struct AuditTrailStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditTrailStorage<'a> {
    /// Create a new audit trail storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn append(&self, entry: &AuditTrailEntry) -> PgResult<()> {
        query(
            r#"
            INSERT INTO audit_trails
                (id, user_id, action, resource_type, resource_id, details, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id.as_deref())
        .bind(&entry.details)
        .bind(entry.timestamp)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// The user's most recent `limit` rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn recent_for_user(&self, user_id: &str, limit: i64) -> PgResult<Vec<AuditTrailEntry>> {
        let rows: Vec<AuditTuple> = query_as(
            r#"
            SELECT id, user_id, action, resource_type, resource_id, details, timestamp
            FROM (
                SELECT seq, id, user_id, action, resource_type, resource_id, details, timestamp
                FROM audit_trails
                WHERE user_id = $1
                ORDER BY seq DESC
                LIMIT $2
            ) recent
            ORDER BY seq ASC
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(entry_from_tuple).collect())
    }
}
