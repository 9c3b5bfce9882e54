//! Cached representations of resources.

use crate::link::Link;
use crate::{Error, Result};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// The body of a successful `GET`, together with the links parsed from it.
///
/// Representations are immutable and shared: every caller that reads a cached
/// resource gets the same `Arc<Representation>`.
#[derive(Debug, Clone)]
pub struct Representation {
    /// The URI the representation was fetched from.
    pub uri: Url,
    /// The status of the response that produced it.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The raw body.
    pub body: String,
    /// Links extracted from the body.
    pub links: Vec<Link>,
}

impl Representation {
    /// Returns the `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }

    /// Returns the first link with the given relation.
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.rel == rel)
    }

    /// Returns all links with the given relation.
    pub fn links_by_rel<'a>(&'a self, rel: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |link| link.rel == rel)
    }

    /// Returns `true` if at least one link has the given relation.
    pub fn has_link(&self, rel: &str) -> bool {
        self.link(rel).is_some()
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] if the body does not match `T`.
    pub fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str(&self.body).map_err(|e| Error::DeserializationFailed {
            raw_response: self.body.clone(),
            serde_error: e.to_string(),
            status: self.status,
        })
    }
}
