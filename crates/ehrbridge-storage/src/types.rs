//! Row types for the four persisted tables.

use ehrbridge_config::EncryptedBlob;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persisted OAuth credentials for one user session (`credential_tokens`).
///
/// Token values are only ever stored as [`EncryptedBlob`]s; expiry is an
/// absolute instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// Owning user identifier.
    pub user_id: String,

    /// Encrypted access token.
    pub access_token: EncryptedBlob,

    /// Encrypted refresh token, when the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<EncryptedBlob>,

    /// Absolute expiry of the access token.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the record was first created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Scope string granted by the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// SMART launch patient context, if the provider returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
}

impl TokenRecord {
    /// Returns `true` if the access token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// One append-only clinical access row (`audit_trails`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrailEntry {
    pub id: Uuid,
    pub user_id: String,
    pub action: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AuditTrailEntry {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: Option<String>,
        details: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id,
            details,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// One append-only security event row (`security_logs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogEntry {
    pub id: Uuid,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub details: Value,
    pub success: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl SecurityLogEntry {
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        user_id: Option<String>,
        details: Value,
        success: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            user_id,
            details,
            success,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// `(user, resource, action)` tuple owned by the external entitlement system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub user_id: String,
    pub resource: String,
    /// Action verb, or `*` for every action on `resource`.
    pub action: String,
}

/// Action value that grants every action on a resource.
pub const WILDCARD_ACTION: &str = "*";

impl PermissionGrant {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Returns `true` if this grant authorizes `action` on `resource` for `user_id`.
    #[must_use]
    pub fn covers(&self, user_id: &str, resource: &str, action: &str) -> bool {
        self.user_id == user_id
            && self.resource == resource
            && (self.action == action || self.action == WILDCARD_ACTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_grant_covers_exact_and_wildcard() {
        let exact = PermissionGrant::new("dr-1", "DiagnosticReport", "read");
        assert!(exact.covers("dr-1", "DiagnosticReport", "read"));
        assert!(!exact.covers("dr-1", "DiagnosticReport", "write"));
        assert!(!exact.covers("dr-2", "DiagnosticReport", "read"));

        let wildcard = PermissionGrant::new("dr-1", "Observation", WILDCARD_ACTION);
        assert!(wildcard.covers("dr-1", "Observation", "write"));
        assert!(!wildcard.covers("dr-1", "Patient", "read"));
    }

    #[test]
    fn test_token_record_expiry() {
        let now = OffsetDateTime::now_utc();
        let record = TokenRecord {
            user_id: "dr-1".to_string(),
            access_token: EncryptedBlob::from_stored("v1.a.b"),
            refresh_token: None,
            expires_at: now + Duration::minutes(1),
            created_at: now,
            scope: None,
            patient: None,
        };
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + Duration::minutes(1)));
    }

    #[test]
    fn test_token_record_serializes_camel_case() {
        let now = OffsetDateTime::now_utc();
        let record = TokenRecord {
            user_id: "dr-1".to_string(),
            access_token: EncryptedBlob::from_stored("v1.a.b"),
            refresh_token: Some(EncryptedBlob::from_stored("v1.c.d")),
            expires_at: now,
            created_at: now,
            scope: Some("openid".to_string()),
            patient: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], "dr-1");
        assert_eq!(json["accessToken"], "v1.a.b");
        assert!(json.get("patient").is_none());
    }
}
