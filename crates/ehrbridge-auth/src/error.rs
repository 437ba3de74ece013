//! Authentication error types.
//!
//! This module defines every error the token lifecycle can produce, plus the
//! predicates callers use to decide between "reconnect required" and "retry".

use std::fmt;

use ehrbridge_config::CipherError;
use ehrbridge_storage::StorageError;

/// Errors that can occur during the OAuth2 token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The OAuth client is misconfigured (missing client id or endpoints).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The token endpoint rejected an authorization code.
    #[error("Token exchange failed (HTTP {status}): {message}")]
    TokenExchange {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Provider error text, folded from the OAuth error body when present.
        message: String,
    },

    /// The token endpoint rejected a refresh token.
    #[error("Token refresh failed (HTTP {status}): {message}")]
    TokenRefresh {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Provider error text, folded from the OAuth error body when present.
        message: String,
    },

    /// No valid access token is available for this session.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The callback `state` is unknown, expired, or already consumed.
    #[error("Invalid authorization state: {message}")]
    InvalidState {
        /// Description of why the state was rejected.
        message: String,
    },

    /// The token endpoint answered 2xx with a body that is not a usable token response.
    #[error("Invalid token response: {message}")]
    InvalidResponse {
        /// Description of the parse failure.
        message: String,
    },

    /// Encrypting or decrypting a persisted token failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Persisting or loading the token record failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The token endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `TokenExchange` error.
    #[must_use]
    pub fn token_exchange(status: u16, message: impl Into<String>) -> Self {
        Self::TokenExchange {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `TokenRefresh` error.
    #[must_use]
    pub fn token_refresh(status: u16, message: impl Into<String>) -> Self {
        Self::TokenRefresh {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `InvalidState` error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns `true` if the user must go through the authorization flow again.
    ///
    /// Network and storage failures are not included: retrying may succeed.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            Self::TokenExchange { .. }
            | Self::TokenRefresh { .. }
            | Self::NotAuthenticated
            | Self::InvalidState { .. } => true,
            Self::Cipher(e) => e.is_decryption(),
            _ => false,
        }
    }

    /// Returns `true` if the failure is likely transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// HTTP status from the token endpoint, if this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TokenExchange { status, .. } | Self::TokenRefresh { status, .. } => {
                Some(*status)
            }
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> AuthErrorCategory {
        match self {
            Self::Configuration { .. } => AuthErrorCategory::Configuration,
            Self::TokenExchange { .. }
            | Self::TokenRefresh { .. }
            | Self::NotAuthenticated
            | Self::InvalidState { .. } => AuthErrorCategory::Authentication,
            Self::InvalidResponse { .. } | Self::Network(_) => AuthErrorCategory::Provider,
            Self::Cipher(_) => AuthErrorCategory::Crypto,
            Self::Storage(_) => AuthErrorCategory::Storage,
        }
    }
}

/// Categories of authentication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCategory {
    /// Misconfiguration detected at construction time.
    Configuration,
    /// The session must be (re-)authorized.
    Authentication,
    /// The provider was unreachable or answered nonsense.
    Provider,
    /// Token encryption/decryption failure.
    Crypto,
    /// Credential persistence failure.
    Storage,
}

impl fmt::Display for AuthErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Authentication => write!(f, "authentication"),
            Self::Provider => write!(f, "provider"),
            Self::Crypto => write!(f, "crypto"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::token_exchange(400, "invalid_grant: code expired");
        assert_eq!(
            err.to_string(),
            "Token exchange failed (HTTP 400): invalid_grant: code expired"
        );
        assert_eq!(AuthError::NotAuthenticated.to_string(), "Not authenticated");
    }

    #[test]
    fn test_requires_reauthentication() {
        assert!(AuthError::NotAuthenticated.requires_reauthentication());
        assert!(AuthError::token_refresh(401, "revoked").requires_reauthentication());
        assert!(AuthError::invalid_state("unknown").requires_reauthentication());
        assert!(
            AuthError::Cipher(CipherError::Decryption("tag mismatch".into()))
                .requires_reauthentication()
        );

        let storage = AuthError::Storage(StorageError::connection_error("down"));
        assert!(!storage.requires_reauthentication());
        assert!(storage.is_transient());
    }

    #[test]
    fn test_status() {
        assert_eq!(AuthError::token_exchange(400, "x").status(), Some(400));
        assert_eq!(AuthError::token_refresh(401, "x").status(), Some(401));
        assert_eq!(AuthError::NotAuthenticated.status(), None);
    }

    #[test]
    fn test_category() {
        assert_eq!(
            AuthError::configuration("no client id").category(),
            AuthErrorCategory::Configuration
        );
        assert_eq!(
            AuthError::invalid_response("not json").category(),
            AuthErrorCategory::Provider
        );
        assert_eq!(AuthErrorCategory::Crypto.to_string(), "crypto");
    }
}
