//! The client, its request pipeline and its resource cache.
//!
//! The [`Client`] is the entry point: it hands out [`Resource`]s for URIs and keeps
//! exactly one `Resource` per URI until that resource is deleted or the cache is
//! cleared. Use [`ClientBuilder`] to configure authentication, timeouts and
//! collaborators.

use crate::{
    auth::{AuthConfig, AuthStrategy, OAuth2Helper, Recovery},
    link::{HalLinkParser, LinkParser},
    metadata::RequestMetadata,
    resource::Resource,
    transport::{ReqwestTransport, Transport, TransportRequest},
    Error, Response, Result,
};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

const DEFAULT_ACCEPT: &str = "application/hal+json, application/json;q=0.9, */*;q=0.8";

/// A hypermedia client with a per-client resource cache.
///
/// Cloning a `Client` is cheap and clones share the same cache and credentials.
///
/// # Examples
///
/// ```no_run
/// use ketting::{auth::AuthConfig, auth::BasicCredentials, Client};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ketting::Error> {
/// let client = Client::builder()
///     .root_uri("https://api.example.com/")?
///     .auth(AuthConfig::Basic(BasicCredentials::new("alice", "secret")))
///     .timeout(Duration::from_secs(30))
///     .build()?;
///
/// // Follow a link from the root document
/// let orders = client.follow("orders").await?;
/// let representation = orders.get().await?;
/// println!("{}", representation.body);
///
/// // Update a resource; its cached representation is dropped
/// orders.put(&serde_json::json!({ "status": "shipped" })).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    root: Url,
    pipeline: Arc<Pipeline>,
    cache: Arc<ResourceCache>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates an unauthenticated client for `root_uri` with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid.
    pub fn new(root_uri: impl AsRef<str>) -> Result<Self> {
        Self::builder().root_uri(root_uri)?.build()
    }

    /// The URI of the root resource. Relative URIs are resolved against it.
    pub fn root_uri(&self) -> &Url {
        &self.inner.root
    }

    /// Returns the resource at the root URI.
    pub fn root_resource(&self) -> Resource {
        self.inner
            .cache
            .resolve(&self.inner.pipeline, self.inner.root.clone())
    }

    /// Returns the resource for `uri`, resolved against the root URI.
    ///
    /// No request is made. Calling this twice with the same URI returns the same
    /// shared instance until it is evicted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `uri` cannot be resolved.
    pub fn get_resource(&self, uri: impl AsRef<str>) -> Result<Resource> {
        let url = self.inner.root.join(uri.as_ref())?;
        Ok(self.inner.cache.resolve(&self.inner.pipeline, url))
    }

    /// Follows the first `rel` link of the root resource, fetching it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkNotFound`] if the root has no such link, or the error
    /// of fetching the root.
    pub async fn follow(&self, rel: &str) -> Result<Resource> {
        self.root_resource().follow(rel).await
    }

    /// Follows every `rel` link of the root resource.
    pub async fn follow_all(&self, rel: &str) -> Result<Vec<Resource>> {
        self.root_resource().follow_all(rel).await
    }

    /// Empties the resource cache.
    ///
    /// Handles already held stay usable but are no longer handed out.
    pub fn clear_cache(&self) {
        let evicted = self.inner.cache.clear();
        tracing::debug!(evicted = evicted, "Cleared resource cache");
    }

    /// Returns `true` if a resource for `uri` is currently cached.
    pub fn is_cached(&self, uri: impl AsRef<str>) -> Result<bool> {
        let url = self.inner.root.join(uri.as_ref())?;
        Ok(self.inner.cache.contains(&url))
    }

    /// The active authentication strategy.
    pub fn auth(&self) -> &AuthStrategy {
        &self.inner.pipeline.auth
    }

    /// The OAuth2 helper, when the `oauth2` strategy is active.
    pub fn oauth2_helper(&self) -> Option<&OAuth2Helper> {
        self.inner.pipeline.auth.oauth2()
    }
}

/// Sends requests with credentials attached and runs the 401 recovery cycle.
pub(crate) struct Pipeline {
    transport: Arc<dyn Transport>,
    auth: AuthStrategy,
    default_headers: HeaderMap,
    link_parser: Arc<dyn LinkParser>,
}

impl Pipeline {
    pub(crate) fn link_parser(&self) -> &dyn LinkParser {
        self.link_parser.as_ref()
    }

    /// Sends one logical request to `uri`.
    ///
    /// At most one replay happens, after the auth strategy recovered from a 401.
    /// A second 401 is an authentication error. Any other status is returned as is.
    pub(crate) async fn send(&self, uri: &Url, metadata: &RequestMetadata) -> Result<Response> {
        let start_time = Instant::now();

        let sent = self.auth.headers_for(uri).await?;
        let first = self.execute(uri, metadata, &sent, 1).await?;
        if first.status != StatusCode::UNAUTHORIZED {
            return Ok(self.finish(first, start_time, 1));
        }

        match self.auth.recover_from_unauthorized(&sent).await? {
            Recovery::GiveUp => Ok(self.finish(first, start_time, 1)),
            Recovery::Retry => {
                let headers = self.auth.headers_for(uri).await?;
                let retried = self.execute(uri, metadata, &headers, 2).await?;
                if retried.status == StatusCode::UNAUTHORIZED {
                    tracing::warn!(
                        method = %metadata.method,
                        url = %uri,
                        "Request rejected again after token refresh"
                    );
                    return Err(Error::authentication(
                        "Request still unauthorized after refreshing the token",
                        Some(StatusCode::UNAUTHORIZED),
                    ));
                }
                Ok(self.finish(retried, start_time, 2))
            }
        }
    }

    /// Executes a single attempt.
    async fn execute(
        &self,
        uri: &Url,
        metadata: &RequestMetadata,
        auth_headers: &HeaderMap,
        attempt: usize,
    ) -> Result<crate::transport::TransportResponse> {
        let mut url = uri.clone();
        if !metadata.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(&metadata.query_params);
        }

        tracing::debug!(
            method = %metadata.method,
            url = %url,
            attempt = attempt,
            "Executing HTTP request"
        );

        // Later layers override earlier ones
        let mut headers = self.default_headers.clone();
        for (name, value) in &metadata.headers {
            headers.insert(name, value.clone());
        }
        for (name, value) in auth_headers {
            headers.insert(name, value.clone());
        }

        self.transport
            .perform(TransportRequest {
                method: metadata.method.clone(),
                url,
                headers,
                body: metadata.body.clone(),
            })
            .await
    }

    fn finish(
        &self,
        response: crate::transport::TransportResponse,
        start_time: Instant,
        attempts: usize,
    ) -> Response {
        let latency = start_time.elapsed();

        tracing::info!(
            status = response.status.as_u16(),
            latency_ms = latency.as_millis(),
            attempts = attempts,
            "Received HTTP response"
        );

        Response::new(
            response.status,
            response.headers,
            response.body,
            latency,
            attempts,
        )
    }
}

/// The URI → [`Resource`] map of one client.
pub(crate) struct ResourceCache {
    entries: Mutex<HashMap<Url, Resource>>,
}

impl ResourceCache {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached resource for `url`, creating it if absent.
    pub(crate) fn resolve(self: &Arc<Self>, pipeline: &Arc<Pipeline>, url: Url) -> Resource {
        let url = canonicalize(url);
        self.entries
            .lock()
            .entry(url)
            .or_insert_with_key(|url| {
                tracing::debug!(url = %url, "Caching new resource");
                Resource::new(url.clone(), pipeline.clone(), Arc::downgrade(self))
            })
            .clone()
    }

    /// Drops the entry for the URI of `resource`, whichever instance holds it.
    ///
    /// An entry held by a different instance is reset too, so handles to it stop
    /// serving the deleted representation.
    pub(crate) fn evict(&self, resource: &Resource) -> bool {
        let removed = self.entries.lock().remove(resource.uri());
        match removed {
            Some(cached) => {
                if !Resource::ptr_eq(&cached, resource) {
                    cached.invalidate();
                }
                true
            }
            None => false,
        }
    }

    fn contains(&self, url: &Url) -> bool {
        self.entries.lock().contains_key(&canonicalize(url.clone()))
    }

    fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let evicted = entries.len();
        entries.clear();
        evicted
    }
}

fn canonicalize(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use ketting::ClientBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ketting::Error> {
/// let client = ClientBuilder::new()
///     .root_uri("https://api.example.com/")?
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    root: Option<Url>,
    auth: AuthConfig,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    link_parser: Option<Arc<dyn LinkParser>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            http::header::ACCEPT,
            HeaderValue::from_static(DEFAULT_ACCEPT),
        );

        Self {
            root: None,
            auth: AuthConfig::None,
            default_headers,
            timeout: None,
            transport: None,
            link_parser: None,
        }
    }

    /// Sets the URI of the root resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid.
    pub fn root_uri(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.root = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the authentication strategy.
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request timeout of the default transport.
    ///
    /// Ignored when a custom transport is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the default reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the default HAL link parser.
    pub fn link_parser(mut self, link_parser: Arc<dyn LinkParser>) -> Self {
        self.link_parser = Some(link_parser);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no root URI was provided, or if the transport or the
    /// authentication strategy cannot be constructed.
    pub fn build(self) -> Result<Client> {
        let root = self
            .root
            .ok_or_else(|| Error::ConfigurationError("Root URI is required".to_string()))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };

        let auth = AuthStrategy::from_config(self.auth, transport.clone())?;
        tracing::debug!(root = %root, auth = auth.kind(), "Building client");

        let link_parser: Arc<dyn LinkParser> = match self.link_parser {
            Some(link_parser) => link_parser,
            None => Arc::new(HalLinkParser),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                root: canonicalize(root),
                pipeline: Arc::new(Pipeline {
                    transport,
                    auth,
                    default_headers: self.default_headers,
                    link_parser,
                }),
                cache: Arc::new(ResourceCache::new()),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new("http://localhost:3000/hal1.json").unwrap()
    }

    #[test]
    fn test_same_uri_yields_same_instance() {
        let client = client();
        let a = client.get_resource("/orders/1").unwrap();
        let b = client
            .get_resource("http://localhost:3000/orders/1#section")
            .unwrap();
        assert!(Resource::ptr_eq(&a, &b));
    }

    #[test]
    fn test_root_resource_is_shared() {
        let client = client();
        assert!(Resource::ptr_eq(
            &client.root_resource(),
            &client.get_resource("/hal1.json").unwrap()
        ));
    }

    #[test]
    fn test_clear_cache_hands_out_new_instances() {
        let client = client();
        let before = client.get_resource("/orders/1").unwrap();
        client.clear_cache();

        assert!(!client.is_cached("/orders/1").unwrap());
        let after = client.get_resource("/orders/1").unwrap();
        assert!(!Resource::ptr_eq(&before, &after));
    }

    #[test]
    fn test_evict_through_stale_handle_drops_current_entry() {
        let client = client();
        let stale = client.get_resource("/orders/1").unwrap();
        client.clear_cache();
        let fresh = client.get_resource("/orders/1").unwrap();

        assert!(client.inner.cache.evict(&stale));
        assert!(!client.is_cached("/orders/1").unwrap());
        assert!(matches!(fresh.state(), crate::ResourceState::Unfetched));

        // Nothing left to evict
        assert!(!client.inner.cache.evict(&fresh));
        assert!(!Resource::ptr_eq(
            &fresh,
            &client.get_resource("/orders/1").unwrap()
        ));
    }

    #[test]
    fn test_build_requires_root() {
        assert!(matches!(
            ClientBuilder::new().build(),
            Err(Error::ConfigurationError(_))
        ));
    }
}
