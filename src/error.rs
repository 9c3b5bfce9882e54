//! Error types for hypermedia requests.
//!
//! Every failed HTTP exchange ends up as exactly one [`Error`] variant. Generic
//! non-2xx responses become [`Error::HttpError`], `application/problem+json`
//! responses become [`Error::Problem`], and failures of the authentication layer
//! become [`Error::Authentication`]. Use [`Error::status`] to read the status code
//! uniformly from any of them.

use crate::problem::Problem;
use http::{HeaderMap, StatusCode};
use url::Url;

/// Boxed error type reported by custom [`Transport`](crate::transport::Transport)
/// implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for ketting.
///
/// # Examples
///
/// ```no_run
/// use ketting::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::new("https://api.example.com/")?;
///
/// match client.get_resource("/orders/1")?.delete().await {
///     Ok(_) => println!("deleted"),
///     Err(Error::Problem(problem)) => {
///         eprintln!("{} ({:?})", problem, problem.detail);
///     }
///     Err(Error::HttpError { status, raw_response, .. }) => {
///         eprintln!("HTTP error {}: {}", status, raw_response);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred in the default reqwest transport
    /// (connection refused, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// A custom transport failed to complete the exchange.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// The server returned a non-2xx status without a structured error body.
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// The server returned an `application/problem+json` error body.
    ///
    /// The message reads `HTTP Error <status>: <title or detail>`.
    #[error("{0}")]
    Problem(Box<Problem>),

    /// The authentication layer could not authorize the request.
    ///
    /// Raised when a token cannot be acquired or refreshed, and when the server
    /// still answers 401 after a successful refresh.
    #[error("Authentication failed: {reason}")]
    Authentication {
        /// What went wrong
        reason: String,
        /// Status returned by the token endpoint or the resource, if any
        status: Option<StatusCode>,
        /// The OAuth2 `error` code returned by the token endpoint, if any
        oauth_error: Option<String>,
    },

    /// The representation has no link with the requested relation.
    #[error("No link with rel \"{rel}\" found on {uri}")]
    LinkNotFound {
        /// The relation that was looked up
        rel: String,
        /// The resource whose representation was searched
        uri: Url,
    },

    /// Failed to deserialize a response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns the HTTP status code if this error has one.
    ///
    /// For [`Error::Problem`] this is the status declared in the problem body.
    ///
    /// # Examples
    ///
    /// ```
    /// use ketting::Error;
    /// use http::StatusCode;
    ///
    /// let err = Error::HttpError {
    ///     status: StatusCode::BAD_REQUEST,
    ///     raw_response: "Bad request".to_string(),
    ///     headers: http::HeaderMap::new(),
    /// };
    ///
    /// assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    /// assert!(!err.is_problem());
    /// ```
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::Problem(problem) => Some(problem.status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::Authentication { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::Problem(problem) => Some(&problem.raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the headers of the failed response, if this error has them.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Error::HttpError { headers, .. } => Some(headers),
            Error::Problem(problem) => Some(&problem.headers),
            _ => None,
        }
    }

    /// Returns the structured problem if the server sent one.
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            Error::Problem(problem) => Some(problem),
            _ => None,
        }
    }

    /// Returns `true` if the server sent an `application/problem+json` body.
    pub fn is_problem(&self) -> bool {
        matches!(self, Error::Problem(_))
    }

    /// Returns `true` if the authentication layer gave up on the request.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    pub(crate) fn authentication(reason: impl Into<String>, status: Option<StatusCode>) -> Self {
        Error::Authentication {
            reason: reason.into(),
            status,
            oauth_error: None,
        }
    }
}

/// A specialized `Result` type for ketting operations.
pub type Result<T> = std::result::Result<T, Error>;
