//! Credential token storage.
//!
//! One row per user; token columns hold only encrypted blobs.

use ehrbridge_config::EncryptedBlob;
use ehrbridge_storage::TokenRecord;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use crate::{PgPool, PgResult};

type TokenTuple = (
    String,
    String,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
    Option<String>,
    Option<String>,
);

fn record_from_tuple(row: TokenTuple) -> TokenRecord {
    TokenRecord {
        user_id: row.0,
        access_token: EncryptedBlob::from_stored(row.1),
        refresh_token: row.2.map(EncryptedBlob::from_stored),
        expires_at: row.3,
        created_at: row.4,
        scope: row.5,
        patient: row.6,
    }
}

/// Credential token storage operations.
pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the token record for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_user(&self, user_id: &str) -> PgResult<Option<TokenRecord>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT user_id, access_token, refresh_token, expires_at, created_at, scope, patient
            FROM credential_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(record_from_tuple))
    }

    /// Insert or replace the record for `record.user_id`.
    ///
    /// `created_at` is kept from the first insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert(&self, record: &TokenRecord) -> PgResult<()> {
        query(
            r#"
            INSERT INTO credential_tokens
                (user_id, access_token, refresh_token, expires_at, created_at, scope, patient)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                scope = EXCLUDED.scope,
                patient = EXCLUDED.patient
            "#,
        )
        .bind(&record.user_id)
        .bind(record.access_token.as_str())
        .bind(record.refresh_token.as_ref().map(EncryptedBlob::as_str))
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.scope.as_deref())
        .bind(record.patient.as_deref())
        .execute(self.pool)
        .await?;

        tracing::debug!(user_id = %record.user_id, "Credential token upserted");
        Ok(())
    }

    /// Delete the record for a user.
    ///
    /// Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, user_id: &str) -> PgResult<bool> {
        let result = query("DELETE FROM credential_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_tuple() {
        let now = OffsetDateTime::now_utc();
        let record = record_from_tuple((
            "dr-1".to_string(),
            "v1.a.b".to_string(),
            None,
            now,
            now,
            Some("openid".to_string()),
            Some("pat-9".to_string()),
        ));
        assert_eq!(record.user_id, "dr-1");
        assert_eq!(record.access_token.as_str(), "v1.a.b");
        assert!(record.refresh_token.is_none());
        assert_eq!(record.patient.as_deref(), Some("pat-9"));
    }
}
