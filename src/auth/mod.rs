//! Authentication strategies.
//!
//! A client runs with exactly one [`AuthStrategy`], chosen at construction from an
//! [`AuthConfig`]. The request pipeline only ever asks two things of it: which
//! headers to attach, and whether a 401 can be recovered from.
//!
//! The configuration deserializes from the same shape applications tend to keep in
//! their settings:
//!
//! ```
//! use ketting::auth::AuthConfig;
//!
//! let config: AuthConfig = serde_json::from_str(r#"{
//!     "type": "oauth2",
//!     "client": {
//!         "clientId": "fooClient",
//!         "clientSecret": "barSecret",
//!         "accessTokenUri": "https://auth.example.com/token",
//!         "scopes": ["read"]
//!     },
//!     "owner": { "userName": "alice", "password": "secret" }
//! }"#).unwrap();
//!
//! assert!(matches!(config, AuthConfig::OAuth2(_)));
//! ```

mod basic;
mod oauth2;

pub use basic::{BasicAuth, BasicCredentials};
pub use oauth2::{
    Grant, OAuth2ClientConfig, OAuth2Config, OAuth2Helper, OwnerCredentials, Token, TokenState,
};

use crate::transport::Transport;
use crate::Result;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Which authentication strategy to use, and its settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// Send no credentials.
    #[default]
    None,
    /// HTTP Basic authentication.
    Basic(BasicCredentials),
    /// OAuth2 bearer tokens.
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Config),
}

/// What to do after a request was answered with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Credentials were renewed; replay the request once.
    Retry,
    /// Nothing can be done; the 401 stands.
    GiveUp,
}

/// The active authentication strategy of a client.
#[derive(Debug)]
pub enum AuthStrategy {
    /// Send no credentials.
    None,
    /// Send a fixed Basic header.
    Basic(BasicAuth),
    /// Send OAuth2 bearer tokens, refreshing them on 401.
    OAuth2(OAuth2Helper),
}

impl AuthStrategy {
    /// Builds the strategy described by `config`.
    ///
    /// `transport` is used for token endpoint calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be encoded or the token endpoint
    /// URL is invalid.
    pub fn from_config(config: AuthConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(match config {
            AuthConfig::None => AuthStrategy::None,
            AuthConfig::Basic(credentials) => AuthStrategy::Basic(BasicAuth::new(&credentials)?),
            AuthConfig::OAuth2(config) => {
                AuthStrategy::OAuth2(OAuth2Helper::new(config, transport)?)
            }
        })
    }

    /// The strategy name as used in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthStrategy::None => "none",
            AuthStrategy::Basic(_) => "basic",
            AuthStrategy::OAuth2(_) => "oauth2",
        }
    }

    /// Returns the OAuth2 helper when the `oauth2` strategy is active.
    pub fn oauth2(&self) -> Option<&OAuth2Helper> {
        match self {
            AuthStrategy::OAuth2(helper) => Some(helper),
            _ => None,
        }
    }

    /// Returns the headers to attach to a request for `url`.
    ///
    /// For OAuth2 this may acquire or renew a token first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`](crate::Error::Authentication) if no token
    /// can be obtained.
    pub async fn headers_for(&self, url: &Url) -> Result<HeaderMap> {
        tracing::trace!(url = %url, strategy = self.kind(), "Attaching credentials");

        match self {
            AuthStrategy::None => Ok(HeaderMap::new()),
            AuthStrategy::Basic(basic) => Ok(basic.headers()),
            AuthStrategy::OAuth2(helper) => {
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, helper.authorization_header().await?);
                Ok(headers)
            }
        }
    }

    /// Reacts to a 401 answered to a request sent with `sent` headers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`](crate::Error::Authentication) if the
    /// OAuth2 refresh fails.
    pub async fn recover_from_unauthorized(&self, sent: &HeaderMap) -> Result<Recovery> {
        match self {
            AuthStrategy::None | AuthStrategy::Basic(_) => Ok(Recovery::GiveUp),
            AuthStrategy::OAuth2(helper) => {
                helper
                    .recover_from_unauthorized(oauth2::sent_authorization(sent))
                    .await?;
                Ok(Recovery::Retry)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReqwestTransport;

    fn transport() -> Arc<dyn Transport> {
        Arc::new(ReqwestTransport::new(None).unwrap())
    }

    #[test]
    fn test_parse_none_and_basic() {
        let none: AuthConfig = serde_json::from_str(r#"{"type": "none"}"#).unwrap();
        assert!(matches!(none, AuthConfig::None));

        let basic: AuthConfig =
            serde_json::from_str(r#"{"type": "basic", "userName": "u", "password": "p"}"#)
                .unwrap();
        match basic {
            AuthConfig::Basic(credentials) => {
                assert_eq!(credentials.user_name, "u");
                assert_eq!(credentials.password, "p");
            }
            other => panic!("Expected basic config, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_client_credentials_config() {
        let config: AuthConfig = serde_json::from_str(
            r#"{
                "type": "oauth2",
                "client": {
                    "clientId": "fooClientCredentials",
                    "clientSecret": "barSecretCredentials",
                    "accessTokenUri": "http://localhost:3000/oauth-token",
                    "scopes": ["test"]
                }
            }"#,
        )
        .unwrap();

        let strategy = AuthStrategy::from_config(config, transport()).unwrap();
        assert_eq!(strategy.kind(), "oauth2");
        assert_eq!(strategy.oauth2().unwrap().grant(), Grant::ClientCredentials);
    }

    #[test]
    fn test_invalid_token_url_is_rejected() {
        let config = AuthConfig::OAuth2(OAuth2Config {
            client: OAuth2ClientConfig {
                client_id: "id".to_string(),
                client_secret: None,
                access_token_uri: "not a url".to_string(),
                scopes: Vec::new(),
            },
            owner: None,
        });

        assert!(matches!(
            AuthStrategy::from_config(config, transport()),
            Err(crate::Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_basic_never_recovers() {
        let strategy = AuthStrategy::from_config(
            AuthConfig::Basic(BasicCredentials::new("u", "p")),
            transport(),
        )
        .unwrap();

        let url = Url::parse("http://localhost/").unwrap();
        let headers = strategy.headers_for(&url).await.unwrap();
        assert!(headers.contains_key(AUTHORIZATION));
        assert_eq!(
            strategy.recover_from_unauthorized(&headers).await.unwrap(),
            Recovery::GiveUp
        );
    }

    #[tokio::test]
    async fn test_none_sends_nothing() {
        let strategy = AuthStrategy::from_config(AuthConfig::None, transport()).unwrap();
        let url = Url::parse("http://localhost/").unwrap();
        assert!(strategy.headers_for(&url).await.unwrap().is_empty());
    }
}
