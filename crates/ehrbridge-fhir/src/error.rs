//! Gateway error types.

use ehrbridge_auth::AuthError;

/// Errors returned by [`crate::FhirGateway`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No valid access token; the caller must trigger re-authorization.
    #[error("Not authenticated: re-authorization required")]
    NotAuthenticated,

    /// The FHIR server answered non-2xx. Not retried automatically.
    #[error("Remote API error (HTTP {status}): {body}")]
    RemoteApi {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// Permission enforcement is on and the user holds no matching grant.
    #[error("Permission denied: {user_id} may not read {resource_type}")]
    PermissionDenied {
        user_id: String,
        resource_type: String,
    },

    /// The query cannot be turned into a request.
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// The gateway is misconfigured.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The server answered 2xx with a body that is not FHIR JSON.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Obtaining a token failed for a reason other than "no session".
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The FHIR server could not be reached.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl GatewayError {
    #[must_use]
    pub fn remote_api(status: u16, body: impl Into<String>) -> Self {
        Self::RemoteApi {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// HTTP status preserved for diagnosis, when the failure has one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Auth(e) => e.status(),
            _ => None,
        }
    }

    /// Returns `true` if the user must sign in again ("reconnect required").
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            Self::NotAuthenticated => true,
            Self::RemoteApi { status, .. } => *status == 401,
            Self::Auth(e) => e.requires_reauthentication(),
            _ => false,
        }
    }

    /// Returns `true` if the caller may reasonably retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteApi { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) => true,
            Self::Auth(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
