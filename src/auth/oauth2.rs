//! OAuth2 bearer authentication with lazy token acquisition and
//! refresh-then-retry.
//!
//! The helper moves through these states:
//!
//! ```text
//! NoToken --acquire--> HasToken --401--> refresh --ok--> HasToken
//!    ^                                     |
//!    +--------- next request ------------ Failed <--err--+
//! ```
//!
//! Acquisition and refresh run while the state lock is held, so concurrent
//! requests wait for a single token exchange instead of racing their own.

use crate::transport::{Transport, TransportRequest};
use crate::{Error, Result};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// Configuration of the `oauth2` strategy.
///
/// The presence of `owner` selects the resource-owner-password grant; without it
/// the client-credentials grant is used.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Config {
    /// The OAuth2 client registration.
    pub client: OAuth2ClientConfig,
    /// End-user credentials for the password grant.
    #[serde(default)]
    pub owner: Option<OwnerCredentials>,
}

/// The OAuth2 client registration.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2ClientConfig {
    /// The client identifier.
    pub client_id: String,
    /// The client secret; omitted for public clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// The token endpoint.
    pub access_token_uri: String,
    /// Scopes requested on acquisition.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for OAuth2ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret_set", &self.client_secret.is_some())
            .field("access_token_uri", &self.access_token_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// End-user credentials for the resource-owner-password grant.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerCredentials {
    /// The user name.
    pub user_name: String,
    /// The password.
    pub password: String,
}

impl fmt::Debug for OwnerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerCredentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// OAuth2 grant types used against the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Resource-owner-password credentials.
    Password,
    /// Client credentials.
    ClientCredentials,
    /// Refresh token exchange.
    RefreshToken,
}

impl Grant {
    /// The `grant_type` form value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Grant::Password => "password",
            Grant::ClientCredentials => "client_credentials",
            Grant::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issued access token.
///
/// Tokens are immutable; a refresh produces a new `Token` that replaces the old one.
#[derive(Clone)]
pub struct Token {
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expires_at: Option<Instant>,
    scope: Option<String>,
}

impl Token {
    /// Creates a token without expiry information.
    ///
    /// # Examples
    ///
    /// ```
    /// use ketting::auth::Token;
    /// use std::time::Duration;
    ///
    /// let token = Token::new("barToken", Some("fooRefresh".to_string()), "bearer")
    ///     .with_expires_in(Duration::from_secs(3600));
    ///
    /// assert_eq!(token.access_token(), "barToken");
    /// assert!(!token.is_expired());
    /// ```
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        token_type: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: token_type.into(),
            expires_at: None,
            scope: None,
        }
    }

    /// Sets the lifetime of the access token, counted from now.
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_at = Some(Instant::now() + expires_in);
        self
    }

    /// Sets the granted scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The access token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The refresh token, if one was issued.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// The token type reported by the server, usually `bearer`.
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// The granted scope, if the server reported one.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// When the access token stops being valid, if known.
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns `true` once the known lifetime has elapsed.
    ///
    /// Tokens without expiry information never count as expired; the server
    /// answering 401 is then the only signal.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false)
    }

    fn bearer_header(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::try_from(format!("Bearer {}", self.access_token))
            .map_err(|e| Error::authentication(format!("Unusable access token: {}", e), None))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("refresh_token_set", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// The token state of an [`OAuth2Helper`].
///
/// Acquisition and refresh happen while the helper's lock is held, so those
/// transitional states are never observable from outside.
#[derive(Debug, Clone)]
pub enum TokenState {
    /// No token yet; the next request acquires one.
    NoToken,
    /// A token is available.
    HasToken(Token),
    /// The last refresh failed and the token was discarded. The next request
    /// acquires a fresh token.
    Failed,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    error_description: Option<String>,
}

/// Owns the token of the `oauth2` strategy and talks to the token endpoint.
pub struct OAuth2Helper {
    config: OAuth2Config,
    token_url: Url,
    transport: Arc<dyn Transport>,
    state: Mutex<TokenState>,
}

impl OAuth2Helper {
    /// Creates a helper with no token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `accessTokenUri` is not an absolute URL.
    pub fn new(config: OAuth2Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let token_url = Url::parse(&config.client.access_token_uri)?;
        Ok(Self {
            config,
            token_url,
            transport,
            state: Mutex::new(TokenState::NoToken),
        })
    }

    /// The grant used to acquire tokens.
    pub fn grant(&self) -> Grant {
        if self.config.owner.is_some() {
            Grant::Password
        } else {
            Grant::ClientCredentials
        }
    }

    /// The token endpoint.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Returns a snapshot of the current token state.
    pub async fn token_state(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    /// Installs a previously issued token, replacing whatever state the helper
    /// was in.
    ///
    /// Meant for bootstrapping a token persisted elsewhere and for tests. Waits for
    /// any acquisition or refresh in flight to finish first.
    pub async fn set_token(&self, token: Token) {
        tracing::debug!(token = ?token, "Installing externally provided token");
        *self.state.lock().await = TokenState::HasToken(token);
    }

    /// Drops the current token; the next request acquires a new one.
    pub async fn clear_token(&self) {
        *self.state.lock().await = TokenState::NoToken;
    }

    /// Returns the `Authorization` header for the next request, acquiring or
    /// renewing the token first when needed.
    pub(crate) async fn authorization_header(&self) -> Result<HeaderValue> {
        let mut state = self.state.lock().await;

        let current = match &*state {
            TokenState::HasToken(token) => Some(token.clone()),
            TokenState::NoToken | TokenState::Failed => None,
        };

        let token = match current {
            Some(token) if !token.is_expired() => token,
            Some(token) => {
                tracing::debug!("Access token expired, renewing before sending");
                let renewed = self.renew(&token).await;
                store(&mut state, renewed, TokenState::NoToken)?
            }
            None => {
                let acquired = self.acquire().await;
                store(&mut state, acquired, TokenState::NoToken)?
            }
        };

        token.bearer_header()
    }

    /// Reacts to a 401 answered to a request that carried `rejected`.
    ///
    /// On `Ok` the caller replays the request once with a fresh header.
    pub(crate) async fn recover_from_unauthorized(
        &self,
        rejected: Option<&HeaderValue>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        match (*state).clone() {
            TokenState::HasToken(token) => {
                let current = token.bearer_header()?;
                if rejected.is_some_and(|rejected| *rejected != current) {
                    tracing::debug!("Token already replaced by a concurrent request");
                    return Ok(());
                }

                tracing::warn!("Access token rejected with 401, refreshing");
                let renewed = self.renew(&token).await;
                store(&mut state, renewed, TokenState::Failed).map(|_| ())
            }
            TokenState::NoToken => {
                let acquired = self.acquire().await;
                store(&mut state, acquired, TokenState::NoToken).map(|_| ())
            }
            TokenState::Failed => Err(Error::authentication(
                "Token was discarded after a failed refresh",
                Some(StatusCode::UNAUTHORIZED),
            )),
        }
    }

    /// Exchanges the refresh token if there is one, otherwise runs the
    /// configured grant again.
    async fn renew(&self, token: &Token) -> Result<Token> {
        match token.refresh_token() {
            Some(refresh_token) => {
                let mut form = vec![("refresh_token", refresh_token)];
                self.push_client_fields(&mut form);
                let renewed = self.request_token(Grant::RefreshToken, &form).await?;
                Ok(renewed.or_refresh_token(token.refresh_token.clone()))
            }
            None => self.acquire().await,
        }
    }

    async fn acquire(&self) -> Result<Token> {
        let scope = self.config.client.scopes.join(" ");
        let mut form = Vec::new();

        let grant = self.grant();
        if let Some(owner) = &self.config.owner {
            form.push(("username", owner.user_name.as_str()));
            form.push(("password", owner.password.as_str()));
        }
        self.push_client_fields(&mut form);
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        self.request_token(grant, &form).await
    }

    fn push_client_fields<'a>(&'a self, form: &mut Vec<(&'static str, &'a str)>) {
        form.push(("client_id", self.config.client.client_id.as_str()));
        if let Some(secret) = &self.config.client.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
    }

    async fn request_token(&self, grant: Grant, fields: &[(&str, &str)]) -> Result<Token> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", grant.as_str())
            .extend_pairs(fields)
            .finish();

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        tracing::debug!(
            grant = %grant,
            token_url = %self.token_url,
            "Requesting access token"
        );

        let response = self
            .transport
            .perform(TransportRequest {
                method: Method::POST,
                url: self.token_url.clone(),
                headers,
                body: Some(body.into_bytes()),
            })
            .await?;

        if !response.status.is_success() {
            let err = token_endpoint_error(grant, response.status, &response.body);
            tracing::warn!(
                grant = %grant,
                status = response.status.as_u16(),
                error = %err,
                "Token endpoint rejected grant"
            );
            return Err(err);
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            Error::authentication(
                format!("Malformed token response for {} grant: {}", grant, e),
                Some(response.status),
            )
        })?;

        tracing::info!(
            grant = %grant,
            expires_in = parsed.expires_in,
            "Obtained access token"
        );

        Ok(parsed.into_token())
    }
}

impl fmt::Debug for OAuth2Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Helper")
            .field("client", &self.config.client)
            .field("grant", &self.grant())
            .finish_non_exhaustive()
    }
}

impl TokenResponse {
    fn into_token(self) -> Token {
        let mut token = Token::new(
            self.access_token,
            self.refresh_token,
            self.token_type.unwrap_or_else(|| "bearer".to_string()),
        );
        if let Some(expires_in) = self.expires_in {
            token = token.with_expires_in(Duration::from_secs(expires_in));
        }
        if let Some(scope) = self.scope {
            token = token.with_scope(scope);
        }
        token
    }
}

impl Token {
    // Servers may omit the refresh token on refresh, meaning the old one stays valid.
    fn or_refresh_token(mut self, previous: Option<String>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous;
        }
        self
    }
}

/// Writes the outcome of a token exchange into `state`.
fn store(state: &mut TokenState, outcome: Result<Token>, on_error: TokenState) -> Result<Token> {
    match outcome {
        Ok(token) => {
            *state = TokenState::HasToken(token.clone());
            Ok(token)
        }
        Err(e) => {
            *state = on_error;
            Err(e)
        }
    }
}

fn token_endpoint_error(grant: Grant, status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(oauth) => {
            let reason = match &oauth.error_description {
                Some(description) => format!(
                    "Token endpoint rejected {} grant: {} ({})",
                    grant, oauth.error, description
                ),
                None => format!("Token endpoint rejected {} grant: {}", grant, oauth.error),
            };
            Error::Authentication {
                reason,
                status: Some(status),
                oauth_error: Some(oauth.error),
            }
        }
        Err(_) => Error::authentication(
            format!(
                "Token endpoint rejected {} grant with status {}",
                grant,
                status.as_u16()
            ),
            Some(status),
        ),
    }
}

/// Extracts the `Authorization` header a request was sent with.
pub(crate) fn sent_authorization(headers: &HeaderMap) -> Option<&HeaderValue> {
    headers.get(AUTHORIZATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;

    /// Answers every token request with a canned response and records the bodies.
    struct CannedTokenEndpoint {
        status: StatusCode,
        body: String,
        requests: SyncMutex<Vec<String>>,
    }

    impl CannedTokenEndpoint {
        fn new(status: StatusCode, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                requests: SyncMutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for CannedTokenEndpoint {
        async fn perform(
            &self,
            request: TransportRequest,
        ) -> Result<crate::transport::TransportResponse> {
            let body = String::from_utf8(request.body.unwrap_or_default()).unwrap();
            self.requests.lock().push(body);
            Ok(crate::transport::TransportResponse {
                status: self.status,
                headers: HeaderMap::new(),
                body: self.body.clone(),
            })
        }
    }

    fn config(owner: bool) -> OAuth2Config {
        OAuth2Config {
            client: OAuth2ClientConfig {
                client_id: "fooClient".to_string(),
                client_secret: Some("barSecret".to_string()),
                access_token_uri: "http://localhost:3000/oauth-token".to_string(),
                scopes: vec!["test".to_string(), "extra".to_string()],
            },
            owner: owner.then(|| OwnerCredentials {
                user_name: "fooOwner".to_string(),
                password: "barPassword".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_password_grant_form() {
        let endpoint = CannedTokenEndpoint::new(
            StatusCode::OK,
            r#"{"access_token": "abc", "token_type": "bearer", "refresh_token": "r1"}"#,
        );
        let helper = OAuth2Helper::new(config(true), endpoint.clone()).unwrap();
        assert_eq!(helper.grant(), Grant::Password);

        let header = helper.authorization_header().await.unwrap();
        assert_eq!(header, "Bearer abc");

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            "grant_type=password&username=fooOwner&password=barPassword\
             &client_id=fooClient&client_secret=barSecret&scope=test+extra"
        );
    }

    #[tokio::test]
    async fn test_token_is_reused() {
        let endpoint = CannedTokenEndpoint::new(StatusCode::OK, r#"{"access_token": "abc"}"#);
        let helper = OAuth2Helper::new(config(false), endpoint.clone()).unwrap();
        assert_eq!(helper.grant(), Grant::ClientCredentials);

        helper.authorization_header().await.unwrap();
        helper.authorization_header().await.unwrap();

        assert_eq!(endpoint.requests().len(), 1);
        assert!(endpoint.requests()[0].starts_with("grant_type=client_credentials&client_id="));
    }

    #[tokio::test]
    async fn test_failed_acquisition_leaves_no_token() {
        let endpoint = CannedTokenEndpoint::new(
            StatusCode::UNAUTHORIZED,
            r#"{"error": "invalid_client", "error_description": "unknown client"}"#,
        );
        let helper = OAuth2Helper::new(config(false), endpoint.clone()).unwrap();

        match helper.authorization_header().await {
            Err(Error::Authentication {
                status,
                oauth_error,
                ..
            }) => {
                assert_eq!(status, Some(StatusCode::UNAUTHORIZED));
                assert_eq!(oauth_error.as_deref(), Some("invalid_client"));
            }
            other => panic!("Expected Authentication error, got {:?}", other),
        }
        assert!(matches!(helper.token_state().await, TokenState::NoToken));

        // A later request tries again
        let _ = helper.authorization_header().await;
        assert_eq!(endpoint.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_discards_token() {
        let endpoint = CannedTokenEndpoint::new(
            StatusCode::BAD_REQUEST,
            r#"{"error": "invalid_grant"}"#,
        );
        let helper = OAuth2Helper::new(config(true), endpoint.clone()).unwrap();
        helper
            .set_token(Token::new("stale", Some("barRefresh".to_string()), "bearer"))
            .await;

        let sent = helper.authorization_header().await.unwrap();
        let err = helper.recover_from_unauthorized(Some(&sent)).await.unwrap_err();

        assert!(err.is_authentication());
        assert!(matches!(helper.token_state().await, TokenState::Failed));
        assert_eq!(
            endpoint.requests(),
            vec!["grant_type=refresh_token&refresh_token=barRefresh\
                  &client_id=fooClient&client_secret=barSecret"
                .to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token_when_omitted() {
        let endpoint = CannedTokenEndpoint::new(StatusCode::OK, r#"{"access_token": "fresh"}"#);
        let helper = OAuth2Helper::new(config(true), endpoint.clone()).unwrap();
        helper
            .set_token(Token::new("stale", Some("fooRefresh".to_string()), "bearer"))
            .await;

        let sent = helper.authorization_header().await.unwrap();
        helper.recover_from_unauthorized(Some(&sent)).await.unwrap();

        match helper.token_state().await {
            TokenState::HasToken(token) => {
                assert_eq!(token.access_token(), "fresh");
                assert_eq!(token.refresh_token(), Some("fooRefresh"));
            }
            other => panic!("Expected HasToken, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recovery_skips_refresh_when_token_already_replaced() {
        let endpoint =
            CannedTokenEndpoint::new(StatusCode::OK, r#"{"access_token": "unused"}"#);
        let helper = OAuth2Helper::new(config(true), endpoint.clone()).unwrap();
        helper
            .set_token(Token::new("current", Some("r".to_string()), "bearer"))
            .await;

        let rejected = HeaderValue::from_static("Bearer older");
        helper.recover_from_unauthorized(Some(&rejected)).await.unwrap();

        assert!(endpoint.requests().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_is_renewed_before_sending() {
        let endpoint = CannedTokenEndpoint::new(
            StatusCode::OK,
            r#"{"access_token": "renewed", "expires_in": 3600}"#,
        );
        let helper = OAuth2Helper::new(config(true), endpoint.clone()).unwrap();
        helper
            .set_token(
                Token::new("old", Some("fooRefresh".to_string()), "bearer")
                    .with_expires_in(Duration::ZERO),
            )
            .await;

        let header = helper.authorization_header().await.unwrap();

        assert_eq!(header, "Bearer renewed");
        assert!(endpoint.requests()[0].starts_with("grant_type=refresh_token"));
    }

    #[tokio::test]
    async fn test_cleared_token_is_acquired_again() {
        let endpoint = CannedTokenEndpoint::new(StatusCode::OK, r#"{"access_token": "new"}"#);
        let helper = OAuth2Helper::new(config(false), endpoint.clone()).unwrap();
        helper.set_token(Token::new("old", None, "bearer")).await;

        helper.clear_token().await;
        assert!(matches!(helper.token_state().await, TokenState::NoToken));

        let header = helper.authorization_header().await.unwrap();
        assert_eq!(header, "Bearer new");
        assert_eq!(endpoint.requests().len(), 1);
    }

    #[test]
    fn test_config_debug_hides_secrets() {
        let rendered = format!("{:?}", config(true));
        assert!(!rendered.contains("barSecret"));
        assert!(!rendered.contains("barPassword"));
    }
}
