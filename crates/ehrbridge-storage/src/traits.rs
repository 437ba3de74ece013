//! Storage traits the bridge depends on.
//!
//! The storage engine itself is an external collaborator; these traits are the
//! whole access contract. Backends:
//! - [`crate::InMemoryStore`] - process-local, used by default and in tests
//! - `ehrbridge-postgres` - PostgreSQL backend

use async_trait::async_trait;

use crate::StorageResult;
use crate::types::{AuditTrailEntry, PermissionGrant, SecurityLogEntry, TokenRecord};

/// Persists encrypted OAuth credentials, one record per user.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the token record for a user.
    ///
    /// Returns `None` when the user has no persisted session.
    async fn load_token(&self, user_id: &str) -> StorageResult<Option<TokenRecord>>;

    /// Inserts or replaces the token record keyed by `record.user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted. Callers must treat
    /// this as fatal for the operation: a lost record breaks future refreshes.
    async fn upsert_token(&self, record: &TokenRecord) -> StorageResult<()>;

    /// Deletes the token record for a user.
    ///
    /// Returns `true` if a record was removed, `false` if none existed.
    async fn delete_token(&self, user_id: &str) -> StorageResult<bool>;
}

/// Append-only audit and security log.
///
/// Implementations must preserve insertion order per user so a session's
/// trail reads back as a causally ordered sequence.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends one clinical access row.
    async fn append_audit_trail(&self, entry: &AuditTrailEntry) -> StorageResult<()>;

    /// Appends one security event row.
    async fn append_security_log(&self, entry: &SecurityLogEntry) -> StorageResult<()>;

    /// Returns up to `limit` of the user's most recent audit rows, oldest first.
    async fn audit_trail_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<AuditTrailEntry>>;

    /// Returns up to `limit` of the user's most recent security events, oldest first.
    async fn security_logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<SecurityLogEntry>>;
}

/// Read-only view of the external entitlement system.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Returns `true` if a grant for `(user_id, resource, action)` exists,
    /// including a wildcard (`*`) action grant on the resource.
    async fn has_grant(&self, user_id: &str, resource: &str, action: &str)
    -> StorageResult<bool>;

    /// Lists every grant held by a user.
    async fn grants_for_user(&self, user_id: &str) -> StorageResult<Vec<PermissionGrant>>;
}
