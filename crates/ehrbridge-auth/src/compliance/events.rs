//! Security event and audit action vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Security-relevant event types written to `security_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    // Authorization flow
    AuthorizationStarted,
    TokenExchange,
    TokenRefresh,
    Logout,

    // Key use
    TokenEncryption,
    TokenDecryption,

    // Access control
    PermissionCheck,
}

impl SecurityEventType {
    /// Stable code stored in the `event_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::AuthorizationStarted => "authorization_started",
            SecurityEventType::TokenExchange => "token_exchange",
            SecurityEventType::TokenRefresh => "token_refresh",
            SecurityEventType::Logout => "logout",
            SecurityEventType::TokenEncryption => "token_encryption",
            SecurityEventType::TokenDecryption => "token_decryption",
            SecurityEventType::PermissionCheck => "permission_check",
        }
    }

    /// Returns a human-readable display name
    pub fn display(&self) -> &'static str {
        match self {
            SecurityEventType::AuthorizationStarted => "Authorization Started",
            SecurityEventType::TokenExchange => "Token Exchange",
            SecurityEventType::TokenRefresh => "Token Refresh",
            SecurityEventType::Logout => "Logout",
            SecurityEventType::TokenEncryption => "Token Encrypted",
            SecurityEventType::TokenDecryption => "Token Decrypted",
            SecurityEventType::PermissionCheck => "Permission Checked",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clinical resource access verbs written to `audit_trails`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Read,
    Search,
    Create,
    Update,
    Delete,
}

impl AuditAction {
    /// Stable code stored in the `action` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Read => "read",
            AuditAction::Search => "search",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }

    /// Returns the FHIR AuditEvent action code (C, R, U, D)
    pub fn to_action_code(&self) -> &'static str {
        match self {
            AuditAction::Create => "C",
            AuditAction::Read | AuditAction::Search => "R",
            AuditAction::Update => "U",
            AuditAction::Delete => "D",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_serde() {
        for event in [
            SecurityEventType::AuthorizationStarted,
            SecurityEventType::TokenExchange,
            SecurityEventType::TokenRefresh,
            SecurityEventType::Logout,
            SecurityEventType::TokenEncryption,
            SecurityEventType::TokenDecryption,
            SecurityEventType::PermissionCheck,
        ] {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, event.as_str());
        }
        assert_eq!(
            serde_json::to_value(AuditAction::Search).unwrap(),
            AuditAction::Search.as_str()
        );
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(AuditAction::Search.to_action_code(), "R");
        assert_eq!(AuditAction::Delete.to_action_code(), "D");
        assert_eq!(SecurityEventType::TokenRefresh.display(), "Token Refresh");
    }
}
