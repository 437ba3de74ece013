use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::StorageResult;
use crate::traits::{AuditStore, CredentialStore, PermissionStore};
use crate::types::{AuditTrailEntry, PermissionGrant, SecurityLogEntry, TokenRecord};

/// In-memory backend implementing every storage trait.
///
/// Audit and security rows are kept in global append order; per-user reads
/// filter that sequence, so per-user order is preserved too.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tokens: Arc<RwLock<HashMap<String, TokenRecord>>>,
    audit_trails: Arc<RwLock<Vec<AuditTrailEntry>>>,
    security_logs: Arc<RwLock<Vec<SecurityLogEntry>>>,
    grants: Arc<RwLock<Vec<PermissionGrant>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with permission grants.
    pub fn with_grants(grants: impl IntoIterator<Item = PermissionGrant>) -> Self {
        Self {
            grants: Arc::new(RwLock::new(grants.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Adds a grant (the entitlement system is external; this is for seeding).
    pub async fn add_grant(&self, grant: PermissionGrant) {
        self.grants.write().await.push(grant);
    }

    /// Total number of audit rows across all users.
    pub async fn audit_trail_len(&self) -> usize {
        self.audit_trails.read().await.len()
    }

    /// Total number of security rows across all users.
    pub async fn security_log_len(&self) -> usize {
        self.security_logs.read().await.len()
    }
}

fn tail<T: Clone>(rows: impl Iterator<Item = T>, limit: usize) -> Vec<T> {
    let all: Vec<T> = rows.collect();
    let skip = all.len().saturating_sub(limit);
    all.into_iter().skip(skip).collect()
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn load_token(&self, user_id: &str) -> StorageResult<Option<TokenRecord>> {
        Ok(self.tokens.read().await.get(user_id).cloned())
    }

    async fn upsert_token(&self, record: &TokenRecord) -> StorageResult<()> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(record.user_id.clone(), record.clone());
        tracing::trace!(user_id = %record.user_id, "Token record upserted");
        Ok(())
    }

    async fn delete_token(&self, user_id: &str) -> StorageResult<bool> {
        Ok(self.tokens.write().await.remove(user_id).is_some())
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn append_audit_trail(&self, entry: &AuditTrailEntry) -> StorageResult<()> {
        self.audit_trails.write().await.push(entry.clone());
        Ok(())
    }

    async fn append_security_log(&self, entry: &SecurityLogEntry) -> StorageResult<()> {
        self.security_logs.write().await.push(entry.clone());
        Ok(())
    }

    async fn audit_trail_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<AuditTrailEntry>> {
        let rows = self.audit_trails.read().await;
        Ok(tail(
            rows.iter().filter(|e| e.user_id == user_id).cloned(),
            limit,
        ))
    }

    async fn security_logs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<SecurityLogEntry>> {
        let rows = self.security_logs.read().await;
        Ok(tail(
            rows.iter()
                .filter(|e| e.user_id.as_deref() == Some(user_id))
                .cloned(),
            limit,
        ))
    }
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn has_grant(
        &self,
        user_id: &str,
        resource: &str,
        action: &str,
    ) -> StorageResult<bool> {
        let grants = self.grants.read().await;
        Ok(grants.iter().any(|g| g.covers(user_id, resource, action)))
    }

    async fn grants_for_user(&self, user_id: &str) -> StorageResult<Vec<PermissionGrant>> {
        let grants = self.grants.read().await;
        Ok(grants
            .iter()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ehrbridge_config::EncryptedBlob;
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    fn record(user_id: &str, access: &str) -> TokenRecord {
        let now = OffsetDateTime::now_utc();
        TokenRecord {
            user_id: user_id.to_string(),
            access_token: EncryptedBlob::from_stored(access),
            refresh_token: None,
            expires_at: now + Duration::hours(1),
            created_at: now,
            scope: None,
            patient: None,
        }
    }

    #[tokio::test]
    async fn test_token_upsert_overwrites() {
        let store = InMemoryStore::new();
        store.upsert_token(&record("dr-1", "v1.first")).await.unwrap();
        store.upsert_token(&record("dr-1", "v1.second")).await.unwrap();

        let loaded = store.load_token("dr-1").await.unwrap().unwrap();
        assert_eq!(loaded.access_token.as_str(), "v1.second");
    }

    #[tokio::test]
    async fn test_delete_missing_token_is_ok() {
        let store = InMemoryStore::new();
        assert!(!store.delete_token("nobody").await.unwrap());

        store.upsert_token(&record("dr-1", "v1.x")).await.unwrap();
        assert!(store.delete_token("dr-1").await.unwrap());
        assert!(store.load_token("dr-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audit_trail_preserves_order_per_user() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            let user = if i % 2 == 0 { "dr-1" } else { "dr-2" };
            let entry = AuditTrailEntry::new(
                user,
                "read",
                "DiagnosticReport",
                Some(format!("r{i}")),
                json!({}),
            );
            store.append_audit_trail(&entry).await.unwrap();
        }

        let trail = store.audit_trail_for_user("dr-1", 10).await.unwrap();
        let ids: Vec<_> = trail
            .iter()
            .map(|e| e.resource_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["r0", "r2", "r4"]);

        let last_two = store.audit_trail_for_user("dr-1", 2).await.unwrap();
        assert_eq!(last_two[0].resource_id.as_deref(), Some("r2"));
        assert_eq!(last_two[1].resource_id.as_deref(), Some("r4"));
    }

    #[tokio::test]
    async fn test_security_logs_filter_by_user() {
        let store = InMemoryStore::new();
        store
            .append_security_log(&SecurityLogEntry::new(
                "token_exchange",
                Some("dr-1".to_string()),
                json!({}),
                true,
            ))
            .await
            .unwrap();
        store
            .append_security_log(&SecurityLogEntry::new("startup", None, json!({}), true))
            .await
            .unwrap();

        assert_eq!(store.security_log_len().await, 2);
        let logs = store.security_logs_for_user("dr-1", 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_type, "token_exchange");
    }

    #[tokio::test]
    async fn test_grants() {
        let store = InMemoryStore::with_grants([PermissionGrant::new(
            "dr-1",
            "DiagnosticReport",
            "read",
        )]);
        store
            .add_grant(PermissionGrant::new("dr-1", "Observation", "*"))
            .await;

        assert!(store.has_grant("dr-1", "DiagnosticReport", "read").await.unwrap());
        assert!(!store.has_grant("dr-1", "DiagnosticReport", "write").await.unwrap());
        assert!(store.has_grant("dr-1", "Observation", "write").await.unwrap());
        assert!(!store.has_grant("dr-2", "Observation", "read").await.unwrap());
        assert_eq!(store.grants_for_user("dr-1").await.unwrap().len(), 2);
    }
}
