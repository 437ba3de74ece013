//! OAuth2 authorization-code and refresh-token lifecycle.
//!
//! - [`client`] - stateless token endpoint client, shared across sessions
//! - [`authorize_session`] - CSRF `state` registry for pending redirects
//! - [`manager`] - per-session token state and single-flight refresh

pub mod authorize_session;
pub mod client;
pub mod manager;

pub use authorize_session::{AuthorizationSession, AuthorizationSessions, DEFAULT_SESSION_EXPIRY_SECS};
pub use client::{OAuthClient, TokenResponse};
pub use manager::{DEFAULT_REFRESH_WINDOW_SECS, SessionStatus, TokenManager, expires_within};
