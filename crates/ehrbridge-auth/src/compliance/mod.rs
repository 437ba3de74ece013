//! Compliance subsystem: audit trail, security log, PHI redaction, and
//! permission checks.
//!
//! Audit and security writes never fail the caller. A storage failure is
//! reported with `tracing::warn!` and swallowed so compliance logging cannot
//! block clinical access. Writes are awaited in call order, which keeps each
//! user's trail causally ordered.

pub mod events;
pub mod phi;

use ehrbridge_storage::{
    AuditTrailEntry, DynAuditStore, DynPermissionStore, SecurityLogEntry, StorageResult,
};
use serde_json::{Value, json};

pub use events::{AuditAction, SecurityEventType};
pub use phi::{PhiKind, contains_phi, detect_phi, sanitize_phi, sanitize_value};

/// Records security events and clinical access, and answers permission checks.
///
/// Holds no per-user state; one instance serves the whole process.
#[derive(Clone)]
pub struct ComplianceService {
    audit: DynAuditStore,
    permissions: DynPermissionStore,
}

impl ComplianceService {
    #[must_use]
    pub fn new(audit: DynAuditStore, permissions: DynPermissionStore) -> Self {
        Self { audit, permissions }
    }

    /// Appends a security event. Never fails.
    pub async fn log_security_event(
        &self,
        event_type: SecurityEventType,
        user_id: Option<&str>,
        details: Value,
        success: bool,
    ) {
        let entry = SecurityLogEntry::new(
            event_type.as_str(),
            user_id.map(str::to_string),
            redact_details(details),
            success,
        );

        if let Err(e) = self.audit.append_security_log(&entry).await {
            tracing::warn!(
                event_type = %event_type,
                user_id = user_id.unwrap_or("-"),
                error = %e,
                "Failed to write security event"
            );
        }
    }

    /// Appends a clinical access row. Never fails.
    pub async fn create_audit_trail(
        &self,
        user_id: &str,
        action: AuditAction,
        resource_type: &str,
        resource_id: Option<&str>,
        details: Option<Value>,
    ) {
        let entry = AuditTrailEntry::new(
            user_id,
            action.as_str(),
            resource_type,
            resource_id.map(str::to_string),
            redact_details(details.unwrap_or_else(|| json!({}))),
        );

        if let Err(e) = self.audit.append_audit_trail(&entry).await {
            tracing::warn!(
                user_id,
                action = %action,
                resource_type,
                error = %e,
                "Failed to write audit trail"
            );
        }
    }

    /// Whether `user_id` may perform `action` on `resource`.
    ///
    /// Fails closed: a store error yields `false`.
    pub async fn check_permission(&self, user_id: &str, resource: &str, action: &str) -> bool {
        match self.permissions.has_grant(user_id, resource, action).await {
            Ok(granted) => {
                tracing::debug!(user_id, resource, action, granted, "Permission checked");
                granted
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    resource,
                    action,
                    error = %e,
                    "Permission lookup failed; denying"
                );
                false
            }
        }
    }

    /// Redacts PHI from free text.
    #[must_use]
    pub fn sanitize_phi(&self, text: &str) -> String {
        phi::sanitize_phi(text)
    }

    /// Returns `true` if free text contains PHI.
    #[must_use]
    pub fn contains_phi(&self, text: &str) -> bool {
        phi::contains_phi(text)
    }

    /// The user's most recent audit rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the storage error; reads are not swallowed.
    pub async fn recent_audit_trail(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<AuditTrailEntry>> {
        self.audit.audit_trail_for_user(user_id, limit).await
    }

    /// The user's most recent security events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the storage error; reads are not swallowed.
    pub async fn recent_security_events(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<SecurityLogEntry>> {
        self.audit.security_logs_for_user(user_id, limit).await
    }
}

impl std::fmt::Debug for ComplianceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceService").finish_non_exhaustive()
    }
}

fn redact_details(mut details: Value) -> Value {
    if sanitize_value(&mut details) {
        tracing::debug!("PHI redacted from compliance details");
    }
    details
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use ehrbridge_storage::{
        AuditStore, InMemoryStore, PermissionGrant, PermissionStore, StorageError,
    };

    use super::*;

    /// Store whose every call fails as if the database were down.
    struct UnreachableStore;

    #[async_trait]
    impl AuditStore for UnreachableStore {
        async fn append_audit_trail(&self, _: &AuditTrailEntry) -> StorageResult<()> {
            Err(StorageError::connection_error("connection refused"))
        }
        async fn append_security_log(&self, _: &SecurityLogEntry) -> StorageResult<()> {
            Err(StorageError::connection_error("connection refused"))
        }
        async fn audit_trail_for_user(&self, _: &str, _: usize) -> StorageResult<Vec<AuditTrailEntry>> {
            Err(StorageError::connection_error("connection refused"))
        }
        async fn security_logs_for_user(
            &self,
            _: &str,
            _: usize,
        ) -> StorageResult<Vec<SecurityLogEntry>> {
            Err(StorageError::connection_error("connection refused"))
        }
    }

    #[async_trait]
    impl PermissionStore for UnreachableStore {
        async fn has_grant(&self, _: &str, _: &str, _: &str) -> StorageResult<bool> {
            Err(StorageError::connection_error("connection refused"))
        }
        async fn grants_for_user(&self, _: &str) -> StorageResult<Vec<PermissionGrant>> {
            Err(StorageError::connection_error("connection refused"))
        }
    }

    fn memory_service(store: &Arc<InMemoryStore>) -> ComplianceService {
        ComplianceService::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_permission_fails_closed() {
        let store = Arc::new(UnreachableStore);
        let service = ComplianceService::new(store.clone(), store);
        assert!(!service.check_permission("dr-1", "Patient", "read").await);
    }

    #[tokio::test]
    async fn test_permission_granted_and_denied() {
        let store = Arc::new(InMemoryStore::with_grants([PermissionGrant::new(
            "dr-1", "Patient", "*",
        )]));
        let service = memory_service(&store);
        assert!(service.check_permission("dr-1", "Patient", "read").await);
        assert!(!service.check_permission("dr-1", "Observation", "read").await);
    }

    #[tokio::test]
    async fn test_logging_failures_are_swallowed() {
        let store = Arc::new(UnreachableStore);
        let service = ComplianceService::new(store.clone(), store);
        service
            .log_security_event(SecurityEventType::TokenRefresh, Some("dr-1"), json!({}), true)
            .await;
        service
            .create_audit_trail("dr-1", AuditAction::Read, "Patient", Some("p1"), None)
            .await;
        assert!(service.recent_audit_trail("dr-1", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_audit_trail_order_and_redaction() {
        let store = Arc::new(InMemoryStore::new());
        let service = memory_service(&store);

        service
            .create_audit_trail("dr-1", AuditAction::Search, "DiagnosticReport", None, None)
            .await;
        service
            .create_audit_trail(
                "dr-1",
                AuditAction::Read,
                "Patient",
                Some("p1"),
                Some(json!({"note": "called 555-123-4567"})),
            )
            .await;

        let trail = service.recent_audit_trail("dr-1", 10).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, "search");
        assert_eq!(trail[1].action, "read");
        assert_eq!(trail[1].details["note"], "called [REDACTED PHONE]");
    }

    #[tokio::test]
    async fn test_security_event_recorded() {
        let store = Arc::new(InMemoryStore::new());
        let service = memory_service(&store);
        service
            .log_security_event(
                SecurityEventType::TokenExchange,
                Some("dr-1"),
                json!({"status": 400}),
                false,
            )
            .await;

        let events = service.recent_security_events("dr-1", 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "token_exchange");
        assert!(!events[0].success);
    }
}
