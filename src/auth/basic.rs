//! HTTP Basic authentication.

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;
use std::fmt;

/// User name and password for the `basic` strategy.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicCredentials {
    /// The user name.
    pub user_name: String,
    /// The password.
    pub password: String,
}

impl BasicCredentials {
    /// Creates a credential pair.
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Attaches a fixed `Authorization: Basic ...` header to every request.
#[derive(Clone)]
pub struct BasicAuth {
    header: HeaderValue,
}

impl BasicAuth {
    /// Encodes the credentials once, up front.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the encoded value is not a valid header.
    pub fn new(credentials: &BasicCredentials) -> Result<Self> {
        let encoded = STANDARD.encode(format!(
            "{}:{}",
            credentials.user_name, credentials.password
        ));
        let mut header = HeaderValue::try_from(format!("Basic {}", encoded))
            .map_err(|e| Error::ConfigurationError(format!("Invalid basic credentials: {}", e)))?;
        header.set_sensitive(true);
        Ok(Self { header })
    }

    pub(crate) fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.header.clone());
        headers
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_base64_of_user_and_password() {
        let auth = BasicAuth::new(&BasicCredentials::new("user", "pass")).unwrap();
        let headers = auth.headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = BasicCredentials::new("user", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
