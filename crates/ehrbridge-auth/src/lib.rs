//! # ehrbridge-auth
//!
//! OAuth2 token lifecycle and compliance auditing for the EHR bridge.
//!
//! ## Features
//!
//! - **Authorization code flow**: authorize URL with CSRF `state` and FHIR
//!   `aud`, code exchange against the provider's token endpoint
//! - **Token refresh**: transparent, single-flight refresh inside a 5-minute
//!   safety window
//! - **Encrypted persistence**: tokens are stored only as AES-GCM blobs
//! - **Compliance**: append-only audit trail and security log, PHI redaction,
//!   fail-closed permission checks
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ehrbridge_auth::prelude::*;
//!
//! let client = Arc::new(OAuthClient::new(settings.oauth.clone(), base_url, timeout)?);
//! let manager = TokenManager::new("dr-1", client, cipher, store, compliance);
//!
//! let (url, _session) = manager.begin_authorization().await;
//! // ... user signs in, provider redirects back with code + state ...
//! manager.complete_authorization(&code, &state).await?;
//!
//! let token = manager.get_valid_token().await?;
//! ```

pub mod compliance;
pub mod error;
pub mod oauth;

pub use compliance::{AuditAction, ComplianceService, SecurityEventType};
pub use error::{AuthError, AuthErrorCategory, AuthResult};
pub use oauth::{OAuthClient, SessionStatus, TokenManager, TokenResponse};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::compliance::{
        AuditAction, ComplianceService, SecurityEventType, contains_phi, sanitize_phi,
    };
    pub use crate::error::{AuthError, AuthResult};
    pub use crate::oauth::{
        AuthorizationSession, OAuthClient, SessionStatus, TokenManager, TokenResponse,
    };
}
