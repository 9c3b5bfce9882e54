//! Raw HTTP responses as seen by callers of [`Resource::fetch`](crate::Resource::fetch)
//! and the mutating verbs.
//!
//! A [`Response`] keeps the status, headers and body of the final exchange along with
//! the latency of the whole logical request and the number of attempts it took (two
//! when the OAuth2 layer refreshed the token and replayed the request).

use crate::{problem, Error, Result};
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A completed HTTP exchange.
///
/// # Examples
///
/// ```no_run
/// use ketting::Client;
///
/// # async fn example() -> Result<(), ketting::Error> {
/// let client = Client::new("https://api.example.com/")?;
/// let response = client.root_resource().fetch().await?;
///
/// println!("Status: {}", response.status);
/// println!("Request took {:?}", response.latency);
/// if response.was_retried() {
///     println!("Token was refreshed along the way");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The raw response body.
    pub body: String,

    /// The total latency of the request, including a token refresh and replay.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    pub attempts: usize,
}

impl Response {
    /// Creates a new `Response`.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: String,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            latency,
            attempts,
        }
    }

    /// Returns `true` if the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns `true` if the request required a replay.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ketting::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     String::new(),
    ///     Duration::from_millis(100),
    ///     2,
    /// );
    ///
    /// assert!(response.was_retried());
    /// ```
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ketting::Response;
    /// # use http::{HeaderMap, StatusCode, HeaderValue};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/hal+json"));
    ///
    /// let response = Response::new(
    ///     StatusCode::OK,
    ///     headers,
    ///     String::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// assert_eq!(response.header("content-type"), Some("application/hal+json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns the `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Returns the `Location` header, typically set on `201 Created`.
    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body if it does not
    /// match `T`.
    pub fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str(&self.body).map_err(|e| {
            tracing::error!(
                error = %e,
                raw_response = %self.body,
                "Failed to deserialize response"
            );

            Error::DeserializationFailed {
                raw_response: self.body.clone(),
                serde_error: e.to_string(),
                status: self.status,
            }
        })
    }

    /// Turns a non-2xx response into its typed error.
    ///
    /// `application/problem+json` bodies become [`Error::Problem`], everything else
    /// becomes [`Error::HttpError`].
    pub fn error_for_status(self) -> Result<Self> {
        let status = self.status;
        if status.is_success() {
            return Ok(self);
        }

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                response = %self.body,
                "Client error (4xx)"
            );
        } else if status.is_server_error() {
            tracing::warn!(
                status = status.as_u16(),
                response = %self.body,
                "Server error (5xx)"
            );
        }

        Err(problem::classify(status, self.headers, self.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn response(status: StatusCode, content_type: &'static str, body: &str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response::new(status, headers, body.to_string(), Duration::ZERO, 1)
    }

    #[test]
    fn test_success_passes_through() {
        let ok = response(StatusCode::NO_CONTENT, "text/plain", "");
        assert!(ok.error_for_status().is_ok());
    }

    #[test]
    fn test_redirect_status_is_an_error() {
        let err = response(StatusCode::NOT_MODIFIED, "text/plain", "")
            .error_for_status()
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_MODIFIED));
    }

    #[test]
    fn test_problem_response_is_classified() {
        let err = response(
            StatusCode::GONE,
            "application/problem+json",
            r#"{"title": "Some sort of error!", "status": 410}"#,
        )
        .error_for_status()
        .unwrap_err();

        assert!(err.is_problem());
        assert_eq!(err.to_string(), "HTTP Error 410: Some sort of error!");
    }

    #[test]
    fn test_json_deserialization_failure_keeps_body() {
        let res = response(StatusCode::OK, "application/json", "not json");
        match res.json::<serde_json::Value>() {
            Err(Error::DeserializationFailed {
                raw_response,
                status,
                ..
            }) => {
                assert_eq!(raw_response, "not json");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }
}
