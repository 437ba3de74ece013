//! Security event storage (append-only).

use ehrbridge_storage::SecurityLogEntry;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{PgPool, PgResult};

type SecurityTuple = (
    Uuid,
    String,
    Option<String>,
    serde_json::Value,
    bool,
    OffsetDateTime,
);

fn entry_from_tuple(row: SecurityTuple) -> SecurityLogEntry {
    SecurityLogEntry {
        id: row.0,
        event_type: row.1,
        user_id: row.2,
        details: row.3,
        success: row.4,
        timestamp: row.5,
    }
}

/// Security log storage operations.
pub struct SecurityLogStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> SecurityLogStorage<'a> {
    /// Create a new security log storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn append(&self, entry: &SecurityLogEntry) -> PgResult<()> {
        query(
            r#"
            INSERT INTO security_logs (id, event_type, user_id, details, success, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.event_type)
        .bind(entry.user_id.as_deref())
        .bind(&entry.details)
        .bind(entry.success)
        .bind(entry.timestamp)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// The user's most recent `limit` events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn recent_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> PgResult<Vec<SecurityLogEntry>> {
        let rows: Vec<SecurityTuple> = query_as(
            r#"
            SELECT id, event_type, user_id, details, success, timestamp
            FROM (
                SELECT seq, id, event_type, user_id, details, success, timestamp
                FROM security_logs
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
