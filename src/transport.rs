//! The network seam.
//!
//! Everything ketting sends, including token endpoint calls, goes through a
//! [`Transport`]. A transport only fails on true transport problems (DNS,
//! connection, timeout); 4xx and 5xx responses are ordinary return values that the
//! caller classifies.

use crate::{Error, Result};
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use url::Url;

/// A request ready to be put on the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute target URL, query included.
    pub url: Url,
    /// All headers, credentials included.
    pub headers: HeaderMap,
    /// The encoded body.
    pub body: Option<Vec<u8>>,
}

/// What came back from the wire.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body.
    pub body: String,
}

/// Performs HTTP exchanges on behalf of the client.
///
/// Implement this to route requests through something other than reqwest, or to
/// stub the network out in tests.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use http::{HeaderMap, StatusCode};
/// use ketting::transport::{Transport, TransportRequest, TransportResponse};
///
/// struct AlwaysGone;
///
/// #[async_trait]
/// impl Transport for AlwaysGone {
///     async fn perform(&self, _request: TransportRequest) -> ketting::Result<TransportResponse> {
///         Ok(TransportResponse {
///             status: StatusCode::GONE,
///             headers: HeaderMap::new(),
///             body: String::new(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response, whatever its status.
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// The default [`Transport`], backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with an optional per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http_client = builder.build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self { http_client })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Network(e)
    }
}
