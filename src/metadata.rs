//! Per-request options for [`Resource::fetch_with`](crate::Resource::fetch_with).

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metadata for an individual HTTP request against a resource.
///
/// The target URI comes from the resource; this type carries everything else.
///
/// # Examples
///
/// ```
/// use ketting::metadata::RequestMetadata;
/// use http::Method;
///
/// let metadata = RequestMetadata::new(Method::POST)
///     .with_header("Prefer", "return=minimal")?
///     .with_query_param("dry-run", "true")
///     .with_json_body(&serde_json::json!({ "title": "hello" }))?;
///
/// assert_eq!(metadata.method, Method::POST);
/// assert!(metadata.body.is_some());
/// # Ok::<(), ketting::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// Additional headers for this request.
    pub headers: HeaderMap,

    /// Query parameters appended to the resource URI.
    pub query_params: BTreeMap<String, String>,

    /// The encoded request body.
    pub body: Option<Vec<u8>>,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query_params: BTreeMap::new(),
            body: None,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Adds multiple query parameters to the request.
    pub fn with_query_params(
        mut self,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.query_params.extend(params);
        self
    }

    /// Sets a raw body. The caller is responsible for the `Content-Type` header.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` as JSON and sets `Content-Type: application/json`
    /// unless a content type was already given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`](crate::Error::SerializationFailed)
    /// if the value cannot be serialized.
    pub fn with_json_body<B>(mut self, body: &B) -> Result<Self, crate::Error>
    where
        B: Serialize + ?Sized,
    {
        let json =
            serde_json::to_vec(body).map_err(|e| crate::Error::SerializationFailed(e.to_string()))?;
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.body = Some(json);
        Ok(self)
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_body_keeps_caller_content_type() {
        let metadata = RequestMetadata::new(Method::POST)
            .with_header("content-type", "text/plain")
            .unwrap()
            .with_body("hello");

        assert_eq!(metadata.body.as_deref(), Some(&b"hello"[..]));
        assert_eq!(metadata.headers[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_json_body_does_not_override_content_type() {
        let metadata = RequestMetadata::new(Method::POST)
            .with_header("content-type", "application/hal+json")
            .unwrap()
            .with_json_body(&serde_json::json!({ "a": 1 }))
            .unwrap();

        assert_eq!(metadata.headers[CONTENT_TYPE], "application/hal+json");
        assert_eq!(metadata.body.as_deref(), Some(&br#"{"a":1}"#[..]));
    }

    #[test]
    fn test_query_params_are_merged() {
        let metadata = RequestMetadata::default()
            .with_query_param("page", "1")
            .with_query_params(vec![
                ("page".to_string(), "2".to_string()),
                ("size".to_string(), "10".to_string()),
            ]);

        assert_eq!(metadata.method, Method::GET);
        assert_eq!(metadata.query_params["page"], "2");
        assert_eq!(metadata.query_params["size"], "10");
    }
}
