//! Arc-owning storage adapters.
//!
//! These adapters wrap the lifetime-based storage types and own an
//! `Arc<PgPool>`, allowing them to be used as `Arc<dyn CredentialStore>` and
//! friends by the token manager and compliance service.

use std::sync::Arc;

use async_trait::async_trait;
use ehrbridge_storage::{
    AuditStore, AuditTrailEntry, CredentialStore, PermissionGrant, PermissionStore,
    SecurityLogEntry, StorageResult, TokenRecord,
};

use crate::PgPool;
use crate::audit::AuditTrailStorage;
use crate::permission::PermissionStorage;
use crate::security_log::SecurityLogStorage;
use crate::token::TokenStorage;

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// =============================================================================
// Credential store
// =============================================================================

/// Arc-owning PostgreSQL credential store adapter.
#[derive(Clone)]
pub struct ArcCredentialStore {
    pool: Arc<PgPool>,
}

impl ArcCredentialStore {
    /// Create a new Arc-owning credential store.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for ArcCredentialStore {
    async fn load_token(&self, user_id: &str) -> StorageResult<Option<TokenRecord>> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.find_by_user(user_id).await?)
    }

    async fn upsert_token(&self, record: &TokenRecord) -> StorageResult<()> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.upsert(record).await?)
    }

    async fn delete_token(&self, user_id: &str) -> StorageResult<bool> {
        let storage = TokenStorage::new(&self.pool);
        Ok(storage.delete(user_id).await?)
    }
}

// =============================================================================
// Audit store
// =============================================================================

/// Arc-owning PostgreSQL audit store adapter.
#[derive(Clone)]
pub struct ArcAuditStore {
    pool: Arc<PgPool>,
}

impl ArcAuditStore {
    /// Create a new Arc-owning audit store.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for ArcAuditStore {
    async fn append_audit_trail(&self, entry: &AuditTrailEntry) -> StorageResult<()> {
        let storage = AuditTrailStorage::new(&self.pool);
        Ok(storage.append(entry).await?)
    }

    async fn append_security_log(&self, entry: &SecurityLogEntry) -> StorageResult<()> {
        let storage = SecurityLogStorage::new(&self.pool);
        Ok(storage.append(entry).await?)
    }

    async fn audit_trail_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<AuditTrailEntry>> {
        let storage = AuditTrailStorage::new(&self.pool);
        Ok(storage.recent_for_user(user_id, limit_param(limit)).await?)
    }

    async fn security_logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<SecurityLogEntry>> {
        let storage = SecurityLogStorage::new(&self.pool);
        Ok(storage.recent_for_user(user_id, limit_param(limit)).await?)
    }
}

// =============================================================================
// Permission store
// =============================================================================

/// Arc-owning PostgreSQL permission store adapter.
#[derive(Clone)]
pub struct ArcPermissionStore {
    pool: Arc<PgPool>,
}

impl ArcPermissionStore {
    /// Create a new Arc-owning permission store.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for ArcPermissionStore {
    async fn has_grant(
        &self,
        user_id: &str,
        resource: &str,
        action: &str,
    ) -> StorageResult<bool> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.has_grant(user_id, resource, action).await?)
    }

    async fn grants_for_user(&self, user_id: &str) -> StorageResult<Vec<PermissionGrant>> {
        let storage = PermissionStorage::new(&self.pool);
        Ok(storage.list_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_param_saturates() {
        assert_eq!(limit_param(50), 50);
        assert_eq!(limit_param(usize::MAX), i64::MAX);
    }
}
