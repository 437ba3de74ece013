//! Per-session OAuth2 token manager.
//!
//! Session states:
//!
//! ```text
//! Unauthenticated -> Authorizing -> Authenticated -> Expiring -> Authenticated
//!                                                            \-> RevokedOrExpired
//! ```
//!
//! The current token lives in an [`ArcSwapOption`], so [`TokenManager::is_authenticated`]
//! is a lock-free read. Every mutation goes through one `tokio::sync::Mutex`,
//! which also makes refresh single-flight: callers that find the token inside
//! the refresh window queue on the mutex, and whoever gets it first performs
//! the refresh. Later callers see the swapped state and return it without
//! touching the network.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ehrbridge_config::{MAX_TOKEN_LIFETIME_SECS, SecretCipher};
use ehrbridge_storage::{DynCredentialStore, TokenRecord};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use url::Url;

use super::authorize_session::{AuthorizationSession, AuthorizationSessions};
use super::client::{OAuthClient, TokenResponse};
use crate::compliance::{ComplianceService, SecurityEventType};
use crate::error::{AuthError, AuthResult};

/// Default refresh safety window (5 minutes).
pub const DEFAULT_REFRESH_WINDOW_SECS: i64 = 300;

/// Plaintext token state held in memory for one session.
#[derive(Clone, PartialEq, Eq)]
struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: OffsetDateTime,
    created_at: OffsetDateTime,
    scope: Option<String>,
    patient: Option<String>,
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Returns `true` if a token expiring at `expires_at` must be refreshed at `now`.
#[must_use]
pub fn expires_within(expires_at: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    expires_at <= now + window
}

/// Read-only view of the session for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub user_id: String,
    pub authenticated: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub has_refresh_token: bool,
    pub scope: Option<String>,
    pub patient: Option<String>,
}

/// Owns the token lifecycle for one user session.
pub struct TokenManager {
    user_id: String,
    client: Arc<OAuthClient>,
    cipher: Arc<SecretCipher>,
    store: DynCredentialStore,
    compliance: ComplianceService,
    sessions: AuthorizationSessions,
    state: ArcSwapOption<TokenState>,
    gate: Mutex<()>,
    refresh_window: Duration,
    default_expires_in: Duration,
}

impl TokenManager {
    /// Creates an unauthenticated manager for `user_id`.
    ///
    /// Refresh window and default lifetime come from the client's settings.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        client: Arc<OAuthClient>,
        cipher: Arc<SecretCipher>,
        store: DynCredentialStore,
        compliance: ComplianceService,
    ) -> Self {
        let settings = client.settings();
        let refresh_window = if settings.refresh_window_secs > 0 {
            settings.refresh_window_secs
        } else {
            DEFAULT_REFRESH_WINDOW_SECS
        };
        let default_expires_in = settings
            .default_expires_in_secs
            .clamp(1, MAX_TOKEN_LIFETIME_SECS);

        Self {
            user_id: user_id.into(),
            client,
            cipher,
            store,
            compliance,
            sessions: AuthorizationSessions::new(),
            state: ArcSwapOption::empty(),
            gate: Mutex::new(()),
            refresh_window: Duration::seconds(refresh_window),
            default_expires_in: Duration::seconds(default_expires_in),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn client(&self) -> &OAuthClient {
        &self.client
    }

    #[must_use]
    pub fn compliance(&self) -> &ComplianceService {
        &self.compliance
    }

    // -------------------------------------------------------------------------
    // Authorization
    // -------------------------------------------------------------------------

    /// Builds the authorize redirect URL for a caller-supplied `state`.
    #[must_use]
    pub fn build_authorization_url(&self, state: &str) -> Url {
        self.client.authorization_url(state)
    }

    /// Starts an authorization: issues a fresh `state`, remembers it, and
    /// returns the redirect URL together with the session.
    pub async fn begin_authorization(&self) -> (Url, AuthorizationSession) {
        let settings = self.client.settings();
        let session = self.sessions.insert(AuthorizationSession::new(
            settings.redirect_uri.clone(),
            self.client.scope(),
        ));
        let url = self.client.authorization_url(&session.state);

        self.compliance
            .log_security_event(
                SecurityEventType::AuthorizationStarted,
                Some(&self.user_id),
                json!({ "scope": session.scope }),
                true,
            )
            .await;

        (url, session)
    }

    /// Completes an authorization started with [`Self::begin_authorization`].
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidState` if `state` was not issued by this
    /// manager, was already used, or expired; otherwise as [`Self::exchange_code`].
    pub async fn complete_authorization(&self, code: &str, state: &str) -> AuthResult<TokenRecord> {
        if let Err(e) = self.sessions.consume(state) {
            self.compliance
                .log_security_event(
                    SecurityEventType::TokenExchange,
                    Some(&self.user_id),
                    json!({ "reason": "invalid_state" }),
                    false,
                )
                .await;
            return Err(e);
        }
        self.exchange_code(code).await
    }

    /// Exchanges an authorization code, then encrypts and persists the tokens.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenExchange` if the provider rejects the code
    /// - `AuthError::InvalidResponse` if the token response is unusable,
    ///   including an `expires_in` beyond one year
    /// - `AuthError::Network` if the provider is unreachable
    /// - `AuthError::Cipher` / `AuthError::Storage` if the record cannot be
    ///   encrypted or persisted
    pub async fn exchange_code(&self, code: &str) -> AuthResult<TokenRecord> {
        let _guard = self.gate.lock().await;

        let now = OffsetDateTime::now_utc();
        let state = match self
            .client
            .exchange_code(code)
            .await
            .and_then(|response| self.state_from_response(response, None, now, now))
        {
            Ok(state) => state,
            Err(e) => {
                self.compliance
                    .log_security_event(
                        SecurityEventType::TokenExchange,
                        Some(&self.user_id),
                        json!({ "status": e.status(), "error": e.to_string() }),
                        false,
                    )
                    .await;
                return Err(e);
            }
        };

        self.state.store(Some(Arc::new(state.clone())));
        let record = self.persist(&state).await?;

        self.compliance
            .log_security_event(
                SecurityEventType::TokenExchange,
                Some(&self.user_id),
                json!({
                    "expires_at": record.expires_at.unix_timestamp(),
                    "scope": record.scope,
                    "has_refresh_token": record.refresh_token.is_some(),
                }),
                true,
            )
            .await;
        tracing::info!(user_id = %self.user_id, "Authorization code exchanged");

        Ok(record)
    }

    // -------------------------------------------------------------------------
    // Token access
    // -------------------------------------------------------------------------

    /// Returns the current access token, refreshing it first if it expires
    /// within the refresh window.
    ///
    /// `Ok(None)` means re-authentication is required: there is no session,
    /// the token expired with no refresh token, or the provider rejected the
    /// refresh.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Network` when the refresh could not reach the
    /// provider (state is kept, retry later), or a cipher/storage error if the
    /// refreshed record cannot be persisted.
    pub async fn get_valid_token(&self) -> AuthResult<Option<String>> {
        let observed = self.state.load_full();
        let now = OffsetDateTime::now_utc();
        match &observed {
            None => return Ok(None),
            Some(state) if !expires_within(state.expires_at, now, self.refresh_window) => {
                return Ok(Some(state.access_token.clone()));
            }
            Some(_) => {}
        }

        let _guard = self.gate.lock().await;

        // Someone else refreshed (or logged out) while we waited.
        let current = self.state.load_full();
        if !same_state(&observed, &current) {
            return Ok(current.map(|s| s.access_token.clone()));
        }
        let Some(current) = current else {
            return Ok(None);
        };

        let Some(refresh_token) = current.refresh_token.clone() else {
            let now = OffsetDateTime::now_utc();
            if current.expires_at > now {
                return Ok(Some(current.access_token.clone()));
            }
            tracing::info!(user_id = %self.user_id, "Token expired and no refresh token available");
            return Ok(None);
        };

        if self.refresh_locked(&current, &refresh_token).await? {
            Ok(self.state.load().as_ref().map(|s| s.access_token.clone()))
        } else {
            Ok(None)
        }
    }

    /// Redeems a refresh token (the stored one when `refresh_token` is `None`).
    ///
    /// Returns `Ok(false)` when no refresh token is available, or when the
    /// provider rejected it; in the latter case all in-memory token state is
    /// cleared and the session must be re-authorized.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Network` for transport failures (state kept), or a
    /// cipher/storage error if the refreshed record cannot be persisted.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> AuthResult<bool> {
        let _guard = self.gate.lock().await;

        let current = self.state.load_full();
        let token = match (refresh_token, current.as_ref()) {
            (Some(token), _) => token.to_string(),
            (None, Some(state)) => match &state.refresh_token {
                Some(token) => token.clone(),
                None => return Ok(false),
            },
            (None, None) => return Ok(false),
        };

        match current {
            Some(state) => self.refresh_locked(&state, &token).await,
            None => {
                let now = OffsetDateTime::now_utc();
                let placeholder = TokenState {
                    access_token: String::new(),
                    refresh_token: Some(token.clone()),
                    expires_at: now,
                    created_at: now,
                    scope: None,
                    patient: None,
                };
                self.refresh_locked(&placeholder, &token).await
            }
        }
    }

    /// Performs the refresh. Caller must hold `self.gate`.
    async fn refresh_locked(&self, current: &TokenState, refresh_token: &str) -> AuthResult<bool> {
        tracing::debug!(user_id = %self.user_id, "Refreshing access token");

        let refreshed = self.client.refresh(refresh_token).await.and_then(|response| {
            self.state_from_response(
                response,
                Some(current),
                OffsetDateTime::now_utc(),
                current.created_at,
            )
        });

        match refreshed {
            Ok(state) => {
                let rotated = state.refresh_token.as_deref() != Some(refresh_token);
                self.state.store(Some(Arc::new(state.clone())));
                let record = self.persist(&state).await?;

                self.compliance
                    .log_security_event(
                        SecurityEventType::TokenRefresh,
                        Some(&self.user_id),
                        json!({
                            "expires_at": record.expires_at.unix_timestamp(),
                            "refresh_token_rotated": rotated,
                        }),
                        true,
                    )
                    .await;
                tracing::info!(user_id = %self.user_id, "Access token refreshed");
                Ok(true)
            }
            Err(e @ (AuthError::TokenRefresh { .. } | AuthError::InvalidResponse { .. })) => {
                self.state.store(None);
                self.compliance
                    .log_security_event(
                        SecurityEventType::TokenRefresh,
                        Some(&self.user_id),
                        json!({ "status": e.status(), "error": e.to_string(), "terminal": true }),
                        false,
                    )
                    .await;
                tracing::warn!(
                    user_id = %self.user_id,
                    error = %e,
                    "Refresh rejected; re-authorization required"
                );
                Ok(false)
            }
            Err(e) => {
                self.compliance
                    .log_security_event(
                        SecurityEventType::TokenRefresh,
                        Some(&self.user_id),
                        json!({ "error": e.to_string(), "terminal": false }),
                        false,
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// `true` iff an access token exists and has not expired. Lock-free.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        let now = OffsetDateTime::now_utc();
        self.state
            .load()
            .as_ref()
            .is_some_and(|s| s.expires_at > now)
    }

    /// Snapshot of the session for status reporting. Contains no token values.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let state = self.state.load_full();
        SessionStatus {
            user_id: self.user_id.clone(),
            authenticated: self.is_authenticated(),
            expires_at: state.as_ref().map(|s| s.expires_at),
            has_refresh_token: state.as_ref().is_some_and(|s| s.refresh_token.is_some()),
            scope: state.as_ref().and_then(|s| s.scope.clone()),
            patient: state.as_ref().and_then(|s| s.patient.clone()),
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Loads and decrypts the persisted record so this process resumes an
    /// existing session.
    ///
    /// Returns `Ok(false)` when nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Cipher` if the record cannot be decrypted (the
    /// manager stays unauthenticated) or `AuthError::Storage` if it cannot be
    /// loaded.
    pub async fn restore(&self) -> AuthResult<bool> {
        let _guard = self.gate.lock().await;

        let Some(record) = self.store.load_token(&self.user_id).await? else {
            return Ok(false);
        };

        let decrypted = self.cipher.decrypt(&record.access_token).and_then(|access| {
            let refresh = record
                .refresh_token
                .as_ref()
                .map(|blob| self.cipher.decrypt(blob))
                .transpose()?;
            Ok((access, refresh))
        });

        let (access_token, refresh_token) = match decrypted {
            Ok(tokens) => tokens,
            Err(e) => {
                self.state.store(None);
                self.compliance
                    .log_security_event(
                        SecurityEventType::TokenDecryption,
                        Some(&self.user_id),
                        json!({ "error": e.to_string() }),
                        false,
                    )
                    .await;
                return Err(e.into());
            }
        };

        self.state.store(Some(Arc::new(TokenState {
            access_token,
            refresh_token,
            expires_at: record.expires_at,
            created_at: record.created_at,
            scope: record.scope,
            patient: record.patient,
        })));
        self.compliance
            .log_security_event(
                SecurityEventType::TokenDecryption,
                Some(&self.user_id),
                json!({ "expires_at": record.expires_at.unix_timestamp() }),
                true,
            )
            .await;
        tracing::debug!(user_id = %self.user_id, "Session restored from store");

        Ok(true)
    }

    /// Clears in-memory tokens and deletes the persisted record.
    ///
    /// Never fails: a missing record is fine and a storage failure is logged.
    pub async fn logout(&self) {
        let _guard = self.gate.lock().await;
        self.state.store(None);

        let (success, details) = match self.store.delete_token(&self.user_id).await {
            Ok(removed) => (true, json!({ "record_removed": removed })),
            Err(e) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    error = %e,
                    "Failed to delete persisted token record"
                );
                (false, json!({ "error": e.to_string() }))
            }
        };

        self.compliance
            .log_security_event(SecurityEventType::Logout, Some(&self.user_id), details, success)
            .await;
        tracing::info!(user_id = %self.user_id, "Logged out");
    }

    fn state_from_response(
        &self,
        response: TokenResponse,
        previous: Option<&TokenState>,
        now: OffsetDateTime,
        created_at: OffsetDateTime,
    ) -> AuthResult<TokenState> {
        let lifetime = match response.expires_in {
            Some(secs) if secs > MAX_TOKEN_LIFETIME_SECS => {
                return Err(AuthError::invalid_response(format!(
                    "expires_in of {secs}s exceeds the {MAX_TOKEN_LIFETIME_SECS}s maximum"
                )));
            }
            Some(secs) if secs > 0 => Duration::seconds(secs),
            _ => self.default_expires_in,
        };
        let expires_at = now
            .checked_add(lifetime)
            .ok_or_else(|| AuthError::invalid_response("token expiry is out of range"))?;

        Ok(TokenState {
            access_token: response.access_token,
            // Keep the old refresh token unless the provider rotated it.
            refresh_token: response
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            expires_at,
            created_at,
            scope: response
                .scope
                .or_else(|| previous.and_then(|p| p.scope.clone())),
            patient: response
                .patient
                .or_else(|| previous.and_then(|p| p.patient.clone())),
        })
    }

    /// Encrypts `state` and upserts it. Caller must hold `self.gate`.
    async fn persist(&self, state: &TokenState) -> AuthResult<TokenRecord> {
        let encrypted = self.cipher.encrypt(&state.access_token).and_then(|access| {
            let refresh = state
                .refresh_token
                .as_deref()
                .map(|token| self.cipher.encrypt(token))
                .transpose()?;
            Ok((access, refresh))
        });

        let (access_token, refresh_token) = match encrypted {
            Ok(blobs) => blobs,
            Err(e) => {
                self.compliance
                    .log_security_event(
                        SecurityEventType::TokenEncryption,
                        Some(&self.user_id),
                        json!({ "error": e.to_string() }),
                        false,
                    )
                    .await;
                return Err(e.into());
            }
        };

        let record = TokenRecord {
            user_id: self.user_id.clone(),
            access_token,
            refresh_token,
            expires_at: state.expires_at,
            created_at: state.created_at,
            scope: state.scope.clone(),
            patient: state.patient.clone(),
        };
        self.compliance
            .log_security_event(
                SecurityEventType::TokenEncryption,
                Some(&self.user_id),
                json!({ "tokens": 1 + usize::from(record.refresh_token.is_some()) }),
                true,
            )
            .await;

        self.store.upsert_token(&record).await.map_err(|e| {
            tracing::error!(
                user_id = %self.user_id,
                error = %e,
                "Failed to persist token record"
            );
            AuthError::from(e)
        })?;

        Ok(record)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("user_id", &self.user_id)
            .field("authenticated", &self.is_authenticated())
            .field("refresh_window", &self.refresh_window)
            .finish_non_exhaustive()
    }
}

fn same_state(a: &Option<Arc<TokenState>>, b: &Option<Arc<TokenState>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
