//! Classification of failed responses.
//!
//! Responses with a `Content-Type` of `application/problem+json` (RFC 7807) are
//! turned into a [`Problem`]; everything else becomes a generic
//! [`Error::HttpError`].

use crate::Error;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use std::fmt;

/// Media type of structured problem responses.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// A structured error returned by the server.
///
/// `status` mirrors the status declared in the body, which may differ from the
/// status line of the response. When the body does not declare a usable status,
/// the transport status is used instead.
///
/// # Examples
///
/// ```
/// use ketting::problem::Problem;
/// use http::{HeaderMap, StatusCode};
///
/// let problem = Problem::from_body(
///     StatusCode::GONE,
///     HeaderMap::new(),
///     r#"{"title": "Some sort of error!", "status": 410}"#.to_string(),
/// )
/// .unwrap();
///
/// assert_eq!(problem.status, StatusCode::GONE);
/// assert_eq!(problem.to_string(), "HTTP Error 410: Some sort of error!");
/// ```
#[derive(Debug, Clone)]
pub struct Problem {
    /// The status declared by the problem body.
    pub status: StatusCode,
    /// The status line of the HTTP response.
    pub transport_status: StatusCode,
    /// The `type` URI of the problem.
    pub problem_type: Option<String>,
    /// Short summary of the problem.
    pub title: Option<String>,
    /// Explanation specific to this occurrence.
    pub detail: Option<String>,
    /// URI identifying this occurrence.
    pub instance: Option<String>,
    /// The raw response body.
    pub raw_response: String,
    /// The response headers.
    pub headers: HeaderMap,
}

#[derive(Deserialize)]
struct ProblemBody {
    #[serde(rename = "type")]
    problem_type: Option<String>,
    title: Option<String>,
    // Kept loose so a non-numeric status does not reject the whole body
    status: Option<serde_json::Value>,
    detail: Option<String>,
    instance: Option<String>,
}

impl Problem {
    /// Parses a problem body.
    ///
    /// Returns `None` if the body is not a JSON object.
    pub fn from_body(
        transport_status: StatusCode,
        headers: HeaderMap,
        raw_response: String,
    ) -> Option<Self> {
        let body: ProblemBody = match serde_json::from_str(&raw_response) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    status = transport_status.as_u16(),
                    "Unparseable problem+json body"
                );
                return None;
            }
        };

        let status = body
            .status
            .and_then(|code| code.as_u64())
            .and_then(|code| u16::try_from(code).ok())
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(transport_status);

        Some(Self {
            status,
            transport_status,
            problem_type: body.problem_type,
            title: body.title,
            detail: body.detail,
            instance: body.instance,
            raw_response,
            headers,
        })
    }

    /// Returns the human readable message, `HTTP Error <status>: <title or detail>`.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP Error {}", self.status.as_u16())?;
        match self.title.as_deref().or(self.detail.as_deref()) {
            Some(summary) => write!(f, ": {}", summary),
            None => Ok(()),
        }
    }
}

/// Returns `true` if the headers declare an `application/problem+json` body.
pub fn is_problem_response(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(PROBLEM_JSON))
        .unwrap_or(false)
}

/// Turns a failed response into its typed error.
pub(crate) fn classify(status: StatusCode, headers: HeaderMap, raw_response: String) -> Error {
    if is_problem_response(&headers) {
        if let Some(problem) = Problem::from_body(status, headers.clone(), raw_response.clone()) {
            return Error::Problem(Box::new(problem));
        }
    }

    Error::HttpError {
        status,
        raw_response,
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn problem_headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn test_plain_body_is_http_error() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            problem_headers("text/plain"),
            "nope".to_string(),
        );

        assert!(!err.is_problem());
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.raw_response(), Some("nope"));
    }

    #[test]
    fn test_problem_body_with_title() {
        let err = classify(
            StatusCode::GONE,
            problem_headers("application/problem+json"),
            r#"{"title": "Some sort of error!", "status": 410}"#.to_string(),
        );

        assert!(err.is_problem());
        assert_eq!(err.status(), Some(StatusCode::GONE));
        assert_eq!(err.to_string(), "HTTP Error 410: Some sort of error!");
    }

    #[test]
    fn test_declared_status_wins_over_transport_status() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            problem_headers("application/problem+json; charset=utf-8"),
            r#"{"title": "Conflict", "status": 409}"#.to_string(),
        );

        let problem = err.problem().unwrap();
        assert_eq!(problem.status, StatusCode::CONFLICT);
        assert_eq!(problem.transport_status, StatusCode::BAD_REQUEST);
        assert_eq!(problem.message(), "HTTP Error 409: Conflict");
    }

    #[test]
    fn test_missing_status_falls_back_to_transport_status() {
        let err = classify(
            StatusCode::UNPROCESSABLE_ENTITY,
            problem_headers("Application/Problem+JSON"),
            r#"{"detail": "name is required"}"#.to_string(),
        );

        assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
        assert_eq!(err.to_string(), "HTTP Error 422: name is required");
    }

    #[test]
    fn test_invalid_declared_status_falls_back() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            problem_headers("application/problem+json"),
            r#"{"status": 42}"#.to_string(),
        );

        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.to_string(), "HTTP Error 400");
    }

    #[test]
    fn test_malformed_problem_body_is_http_error() {
        let err = classify(
            StatusCode::BAD_GATEWAY,
            problem_headers("application/problem+json"),
            "<html>bad gateway</html>".to_string(),
        );

        assert!(!err.is_problem());
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }
}
