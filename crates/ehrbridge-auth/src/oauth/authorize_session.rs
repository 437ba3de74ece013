//! Authorization redirect sessions.
//!
//! An [`AuthorizationSession`] correlates an outbound authorize redirect with
//! its callback through the opaque `state` parameter. Sessions live in memory
//! only, expire after [`DEFAULT_SESSION_EXPIRY_SECS`], and are consumed
//! exactly once.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use time::{Duration, OffsetDateTime};

use crate::error::{AuthError, AuthResult};

/// Default session expiry in seconds (10 minutes).
pub const DEFAULT_SESSION_EXPIRY_SECS: i64 = 600;

/// Random bytes behind each `state` value.
const STATE_BYTES: usize = 32;

/// One pending authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationSession {
    /// Opaque CSRF token sent as `state`.
    pub state: String,
    /// Redirect URI the provider will call back.
    pub redirect_uri: String,
    /// Space-separated scope requested.
    pub scope: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl AuthorizationSession {
    /// Creates a session with a fresh random state and the default expiry.
    #[must_use]
    pub fn new(redirect_uri: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::with_expiry(redirect_uri, scope, DEFAULT_SESSION_EXPIRY_SECS)
    }

    /// Creates a session with a custom expiry.
    #[must_use]
    pub fn with_expiry(
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
        expiry_secs: i64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            state: generate_state(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            created_at: now,
            expires_at: now + Duration::seconds(expiry_secs),
        }
    }

    /// Returns `true` if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// Generates a URL-safe random state value.
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Registry of pending authorization sessions for one token manager.
#[derive(Debug, Default)]
pub struct AuthorizationSessions {
    pending: Mutex<HashMap<String, AuthorizationSession>>,
}

impl AuthorizationSessions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a session and returns a copy of it.
    ///
    /// Expired sessions are pruned on every insert.
    pub fn insert(&self, session: AuthorizationSession) -> AuthorizationSession {
        let mut pending = self.lock();
        pending.retain(|_, s| !s.is_expired());
        pending.insert(session.state.clone(), session.clone());
        session
    }

    /// Removes and returns the session for `state`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidState` if the state is unknown (never issued
    /// or already consumed) or the session has expired.
    pub fn consume(&self, state: &str) -> AuthResult<AuthorizationSession> {
        let session = self
            .lock()
            .remove(state)
            .ok_or_else(|| AuthError::invalid_state("unknown or already used state"))?;

        if session.is_expired() {
            return Err(AuthError::invalid_state("authorization session expired"));
        }
        Ok(session)
    }

    /// Number of sessions awaiting a callback.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AuthorizationSession>> {
        // A poisoned map is still structurally valid.
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_random_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_session_consumed_once() {
        let sessions = AuthorizationSessions::new();
        let session = sessions.insert(AuthorizationSession::new(
            "https://app.example/callback",
            "openid",
        ));

        let consumed = sessions.consume(&session.state).unwrap();
        assert_eq!(consumed.redirect_uri, "https://app.example/callback");

        let err = sessions.consume(&session.state).unwrap_err();
        assert!(matches!(err, AuthError::InvalidState { .. }));
    }

    #[test]
    fn test_expired_session_rejected() {
        let sessions = AuthorizationSessions::new();
        let session = sessions.insert(AuthorizationSession::with_expiry(
            "https://app.example/callback",
            "openid",
            -1,
        ));

        let err = sessions.consume(&session.state).unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert_eq!(sessions.pending_count(), 0);
    }

    #[test]
    fn test_insert_prunes_expired() {
        let sessions = AuthorizationSessions::new();
        sessions.insert(AuthorizationSession::with_expiry("https://a/cb", "openid", -1));
        sessions.insert(AuthorizationSession::new("https://a/cb", "openid"));
        assert_eq!(sessions.pending_count(), 1);
    }
}
