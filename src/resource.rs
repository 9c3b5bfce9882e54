//! Client-side handles for remote resources.
//!
//! A [`Resource`] is cheap to clone; clones are the same resource and share one
//! state. The client's cache holds one instance per URI.

use crate::client::{Pipeline, ResourceCache};
use crate::link::Link;
use crate::metadata::RequestMetadata;
use crate::representation::Representation;
use crate::{Error, Response, Result};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use url::Url;

/// The cache state of a [`Resource`].
#[derive(Debug, Clone)]
pub enum ResourceState {
    /// Nothing cached; the next `get` goes to the server.
    Unfetched,
    /// The last `get` succeeded and nothing changed the resource since.
    Cached(Arc<Representation>),
    /// The last request failed.
    Failed(LastError),
}

/// Summary of the error that put a resource into [`ResourceState::Failed`].
#[derive(Debug, Clone)]
pub struct LastError {
    /// The status of the failed response, if there was one.
    pub status: Option<StatusCode>,
    /// The error message.
    pub message: String,
}

impl From<&Error> for LastError {
    fn from(e: &Error) -> Self {
        Self {
            status: e.status(),
            message: e.to_string(),
        }
    }
}

/// A remote resource addressed by URI.
///
/// `get` serves the cached representation when there is one. `put`, `post` and
/// `patch` drop it on success; `delete` also removes the resource from the
/// client's cache, so the next lookup of the URI creates a new instance.
///
/// # Examples
///
/// ```no_run
/// use ketting::Client;
///
/// # async fn example() -> Result<(), ketting::Error> {
/// let client = Client::new("https://api.example.com/")?;
/// let article = client.follow("latest-article").await?;
///
/// let first = article.get().await?; // network
/// let again = article.get().await?; // cache
/// assert!(std::sync::Arc::ptr_eq(&first, &again));
///
/// let author = article.follow("author").await?;
/// println!("{}", author.uri());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

struct ResourceInner {
    uri: Url,
    pipeline: Arc<Pipeline>,
    cache: Weak<ResourceCache>,
    state: Mutex<ResourceState>,
    // Held for the duration of a GET so concurrent gets share one request
    fetch_gate: tokio::sync::Mutex<()>,
}

impl Resource {
    pub(crate) fn new(uri: Url, pipeline: Arc<Pipeline>, cache: Weak<ResourceCache>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                uri,
                pipeline,
                cache,
                state: Mutex::new(ResourceState::Unfetched),
                fetch_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Returns `true` if both handles are the same resource instance.
    pub fn ptr_eq(a: &Resource, b: &Resource) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The absolute URI of this resource.
    pub fn uri(&self) -> &Url {
        &self.inner.uri
    }

    /// Returns a snapshot of the cache state.
    pub fn state(&self) -> ResourceState {
        self.inner.state.lock().clone()
    }

    /// Returns the cached representation without making a request.
    pub fn representation(&self) -> Option<Arc<Representation>> {
        match &*self.inner.state.lock() {
            ResourceState::Cached(representation) => Some(representation.clone()),
            _ => None,
        }
    }

    /// Returns the representation, fetching it if nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns the typed error of a failed fetch; the resource is then in
    /// [`ResourceState::Failed`].
    pub async fn get(&self) -> Result<Arc<Representation>> {
        if let Some(representation) = self.representation() {
            tracing::debug!(url = %self.inner.uri, "Serving cached representation");
            return Ok(representation);
        }

        let _gate = self.inner.fetch_gate.lock().await;
        // Another get may have finished while we waited
        if let Some(representation) = self.representation() {
            return Ok(representation);
        }

        self.fetch_representation().await
    }

    /// Fetches the representation from the server even if one is cached.
    pub async fn refresh(&self) -> Result<Arc<Representation>> {
        let _gate = self.inner.fetch_gate.lock().await;
        self.fetch_representation().await
    }

    async fn fetch_representation(&self) -> Result<Arc<Representation>> {
        let pipeline = &self.inner.pipeline;
        let metadata = RequestMetadata::new(Method::GET);

        let result = pipeline
            .send(&self.inner.uri, &metadata)
            .await
            .and_then(Response::error_for_status);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.set_state(ResourceState::Failed(LastError::from(&e)));
                return Err(e);
            }
        };

        let links = pipeline
            .link_parser()
            .parse_links(&self.inner.uri, &response.headers, &response.body);
        let representation = Arc::new(Representation {
            uri: self.inner.uri.clone(),
            status: response.status,
            headers: response.headers,
            body: response.body,
            links,
        });

        self.set_state(ResourceState::Cached(representation.clone()));
        Ok(representation)
    }

    /// Replaces the resource with `body`, sent as JSON.
    ///
    /// # Errors
    ///
    /// Returns the typed error of a non-2xx response.
    pub async fn put<B>(&self, body: &B) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let metadata = RequestMetadata::new(Method::PUT).with_json_body(body)?;
        self.mutate(metadata).await
    }

    /// Posts `body`, sent as JSON, to the resource.
    ///
    /// A `201 Created` response usually names the new resource in
    /// [`Response::location`].
    pub async fn post<B>(&self, body: &B) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let metadata = RequestMetadata::new(Method::POST).with_json_body(body)?;
        self.mutate(metadata).await
    }

    /// Partially updates the resource with `body`, sent as JSON.
    pub async fn patch<B>(&self, body: &B) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let metadata = RequestMetadata::new(Method::PATCH).with_json_body(body)?;
        self.mutate(metadata).await
    }

    /// Deletes the resource and removes its URI from the client's cache.
    ///
    /// Any other instance cached for the same URI is reset as well.
    pub async fn delete(&self) -> Result<Response> {
        let response = self.mutate(RequestMetadata::new(Method::DELETE)).await?;

        if let Some(cache) = self.inner.cache.upgrade() {
            if cache.evict(self) {
                tracing::debug!(url = %self.inner.uri, "Evicted deleted resource");
            }
        }

        Ok(response)
    }

    async fn mutate(&self, metadata: RequestMetadata) -> Result<Response> {
        let result = self
            .inner
            .pipeline
            .send(&self.inner.uri, &metadata)
            .await
            .and_then(Response::error_for_status);

        match result {
            Ok(response) => {
                self.set_state(ResourceState::Unfetched);
                Ok(response)
            }
            Err(e) => {
                self.set_state(ResourceState::Failed(LastError::from(&e)));
                Err(e)
            }
        }
    }

    /// Sends a GET and returns the raw response, whatever its status.
    ///
    /// Credentials are attached and the OAuth2 refresh cycle still applies, but the
    /// cache state is left alone and non-2xx statuses are not turned into errors.
    pub async fn fetch(&self) -> Result<Response> {
        self.fetch_with(RequestMetadata::new(Method::GET)).await
    }

    /// Like [`fetch`](Self::fetch), with a custom method, headers, query or body.
    pub async fn fetch_with(&self, metadata: RequestMetadata) -> Result<Response> {
        self.inner.pipeline.send(&self.inner.uri, &metadata).await
    }

    /// Returns the links of the representation, fetching it if needed.
    pub async fn links(&self) -> Result<Vec<Link>> {
        Ok(self.get().await?.links.clone())
    }

    /// Follows the first `rel` link of this resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkNotFound`] if the representation has no such link.
    pub async fn follow(&self, rel: &str) -> Result<Resource> {
        let representation = self.get().await?;
        let link = representation
            .link(rel)
            .ok_or_else(|| Error::LinkNotFound {
                rel: rel.to_string(),
                uri: self.inner.uri.clone(),
            })?;

        Ok(self.resolve(link.href.clone()))
    }

    /// Follows every `rel` link of this resource. Returns an empty list if there
    /// are none.
    pub async fn follow_all(&self, rel: &str) -> Result<Vec<Resource>> {
        let representation = self.get().await?;
        Ok(representation
            .links_by_rel(rel)
            .map(|link| self.resolve(link.href.clone()))
            .collect())
    }

    fn resolve(&self, url: Url) -> Resource {
        match self.inner.cache.upgrade() {
            Some(cache) => cache.resolve(&self.inner.pipeline, url),
            // The client is gone; hand out an uncached resource
            None => Resource::new(url, self.inner.pipeline.clone(), Weak::new()),
        }
    }

    /// Drops the cached representation, if any.
    pub(crate) fn invalidate(&self) {
        self.set_state(ResourceState::Unfetched);
    }

    fn set_state(&self, state: ResourceState) {
        *self.inner.state.lock() = state;
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("uri", &self.inner.uri.as_str())
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}
