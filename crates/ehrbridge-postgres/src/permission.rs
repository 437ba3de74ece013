//! Permission grant lookups.
//!
//! The `permission_grants` table is owned by the entitlement system; the
//! bridge only reads it.

use ehrbridge_storage::{PermissionGrant, WILDCARD_ACTION};
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;

use crate::{PgPool, PgResult};

/// Permission grant storage operations.
pub struct PermissionStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> PermissionStorage<'a> {
    /// Create a new permission storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Whether the user holds `action` (or the wildcard) on `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn has_grant(&self, user_id: &str, resource: &str, action: &str) -> PgResult<bool> {
        let exists: bool = query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM permission_grants
                WHERE user_id = $1 AND resource = $2 AND action IN ($3, $4)
            )
            "#,
        )
        .bind(user_id)
        .bind(resource)
        .bind(action)
        .bind(WILDCARD_ACTION)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// All grants held by the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_user(&self, user_id: &str) -> PgResult<Vec<PermissionGrant>> {
        let rows: Vec<(String, String, String)> = query_as(
            r#"
            SELECT user_id, resource, action
            FROM permission_grants
            WHERE user_id = $1
            ORDER BY resource, action
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, resource, action)| PermissionGrant {
                user_id,
                resource,
                action,
            })
            .collect())
    }
}
