//! Stateless OAuth2 client for the EHR authorization server.
//!
//! Builds the authorize redirect and talks to the token endpoint. Holds no
//! per-user state, so one instance can be shared by every session.

use std::time::Duration;

use ehrbridge_config::OAuthSettings;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds; the configured default applies when absent.
    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// SMART launch patient context.
    #[serde(default)]
    pub patient: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth error response body (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Folds an error body into a readable message.
fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<OAuthErrorResponse>(body) {
        Ok(oauth_error) => match oauth_error.error_description {
            Some(description) if !description.is_empty() => {
                format!("{}: {}", oauth_error.error, description)
            }
            _ => oauth_error.error,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Which grant a token endpoint call is for; selects the error variant.
#[derive(Debug, Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

/// OAuth2 client bound to one authorization server and FHIR audience.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    settings: OAuthSettings,
    authorization_endpoint: Url,
    token_endpoint: Url,
    audience: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the client id is empty, either
    /// endpoint is not an absolute URL, or the HTTP client cannot be built.
    pub fn new(
        settings: OAuthSettings,
        fhir_base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> AuthResult<Self> {
        if settings.client_id.trim().is_empty() {
            return Err(AuthError::configuration("OAuth client_id is required"));
        }
        let authorization_endpoint = parse_endpoint(
            "authorization_endpoint",
            &settings.authorization_endpoint,
        )?;
        let token_endpoint = parse_endpoint("token_endpoint", &settings.token_endpoint)?;

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            settings,
            authorization_endpoint,
            token_endpoint,
            audience: fhir_base_url.into(),
            http_client,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Space-separated scope string sent to the provider.
    #[must_use]
    pub fn scope(&self) -> String {
        self.settings.scopes.join(" ")
    }

    /// Builds the authorize redirect URL for `state`.
    ///
    /// Deterministic: the same state always yields the same URL.
    #[must_use]
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("scope", &self.scope())
            .append_pair("state", state)
            .append_pair("aud", &self.audience);
        url
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenExchange` on a non-2xx response
    /// - `AuthError::Network` if the endpoint cannot be reached
    /// - `AuthError::InvalidResponse` if the body is not a token response
    pub async fn exchange_code(&self, code: &str) -> AuthResult<TokenResponse> {
        let params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        self.token_request(params, Grant::AuthorizationCode).await
    }

    /// Redeems a refresh token.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenRefresh` on a non-2xx response (terminal)
    /// - `AuthError::Network` if the endpoint cannot be reached (transient)
    /// - `AuthError::InvalidResponse` if the body is not a token response
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        let params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(params, Grant::RefreshToken).await
    }

    async fn token_request<'a>(
        &'a self,
        mut params: Vec<(&'a str, &'a str)>,
        grant: Grant,
    ) -> AuthResult<TokenResponse> {
        params.push(("client_id", self.settings.client_id.as_str()));

        // Add client secret for confidential clients
        if let Some(secret) = &self.settings.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        tracing::debug!(
            endpoint = %self.token_endpoint,
            grant = ?grant,
            "Calling token endpoint"
        );

        let response = self
            .http_client
            .post(self.token_endpoint.as_str())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = describe_error_body(&body);
            tracing::warn!(status = status.as_u16(), grant = ?grant, "Token endpoint rejected request");
            return Err(match grant {
                Grant::AuthorizationCode => AuthError::token_exchange(status.as_u16(), message),
                Grant::RefreshToken => AuthError::token_refresh(status.as_u16(), message),
            });
        }

        let body = response.text().await?;
        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::invalid_response(format!("failed to parse token response: {e}"))
        })?;

        if token.access_token.is_empty() {
            return Err(AuthError::invalid_response("empty access_token"));
        }
        Ok(token)
    }
}

fn parse_endpoint(name: &str, value: &str) -> AuthResult<Url> {
    let url = Url::parse(value)
        .map_err(|e| AuthError::configuration(format!("{name} is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuthError::configuration(format!(
            "{name} must use http or https"
        )));
    }
    Ok(url)
}
