//! Hypermedia links and the parser seam that extracts them.
//!
//! ketting itself does not understand any particular hypermedia format. It asks a
//! [`LinkParser`] for the links of each fetched representation. The default,
//! [`HalLinkParser`], reads the `_links` object of HAL documents.

use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// A link from one resource to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The relation type, e.g. `"next"` or `"author"`.
    pub rel: String,
    /// The absolute target URI.
    pub href: Url,
    /// Human readable title.
    pub title: Option<String>,
    /// Hint about the media type of the target.
    pub media_type: Option<String>,
}

impl Link {
    /// Creates a link without title or media type hint.
    pub fn new(rel: impl Into<String>, href: Url) -> Self {
        Self {
            rel: rel.into(),
            href,
            title: None,
            media_type: None,
        }
    }
}

/// Extracts links from a fetched representation.
///
/// `base` is the URI of the resource the body came from; relative targets must be
/// resolved against it.
pub trait LinkParser: Send + Sync {
    /// Returns every link found in the representation. Links sharing a relation
    /// keep their document order.
    fn parse_links(&self, base: &Url, headers: &HeaderMap, body: &str) -> Vec<Link>;
}

/// Reads links from the `_links` object of a HAL+JSON document.
///
/// Both single link objects and arrays of link objects are accepted. Links whose
/// `href` cannot be resolved are skipped. Bodies that are not JSON have no links.
///
/// # Examples
///
/// ```
/// use http::HeaderMap;
/// use ketting::link::{HalLinkParser, LinkParser};
/// use url::Url;
///
/// let base = Url::parse("https://api.example.com/orders/").unwrap();
/// let body = r#"{"_links": {"next": {"href": "?page=2"}, "item": [{"href": "1"}, {"href": "2"}]}}"#;
///
/// let links = HalLinkParser.parse_links(&base, &HeaderMap::new(), body);
/// assert_eq!(links.len(), 3);
/// assert_eq!(links[0].href.as_str(), "https://api.example.com/orders/1");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HalLinkParser;

#[derive(Deserialize)]
struct HalDocument {
    #[serde(rename = "_links", default)]
    links: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct HalLink {
    href: String,
    title: Option<String>,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

impl LinkParser for HalLinkParser {
    fn parse_links(&self, base: &Url, _headers: &HeaderMap, body: &str) -> Vec<Link> {
        let document: HalDocument = match serde_json::from_str(body) {
            Ok(document) => document,
            Err(_) => return Vec::new(),
        };

        let mut links = Vec::new();
        for (rel, value) in document.links {
            let entries = match value {
                Value::Array(entries) => entries,
                single => vec![single],
            };

            for entry in entries {
                let hal_link: HalLink = match serde_json::from_value(entry) {
                    Ok(hal_link) => hal_link,
                    Err(e) => {
                        tracing::debug!(rel = %rel, error = %e, "Skipping malformed HAL link");
                        continue;
                    }
                };

                match base.join(&hal_link.href) {
                    Ok(href) => links.push(Link {
                        rel: rel.clone(),
                        href,
                        title: hal_link.title,
                        media_type: hal_link.media_type,
                    }),
                    Err(e) => {
                        tracing::debug!(
                            rel = %rel,
                            href = %hal_link.href,
                            error = %e,
                            "Skipping unresolvable HAL link"
                        );
                    }
                }
            }
        }

        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:3000/hal1.json").unwrap()
    }

    #[test]
    fn test_single_and_array_links() {
        let body = r#"{
            "_links": {
                "self": {"href": "/hal1.json"},
                "error400": {"href": "/error/400", "title": "Bad"},
                "item": [{"href": "/a"}, {"href": "/b", "type": "text/plain"}]
            },
            "title": "Hal 1"
        }"#;

        let links = HalLinkParser.parse_links(&base(), &HeaderMap::new(), body);
        assert_eq!(links.len(), 4);

        let error400 = links.iter().find(|l| l.rel == "error400").unwrap();
        assert_eq!(error400.href.as_str(), "http://localhost:3000/error/400");
        assert_eq!(error400.title.as_deref(), Some("Bad"));

        let items: Vec<_> = links.iter().filter(|l| l.rel == "item").collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].media_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_non_json_body_has_no_links() {
        let links = HalLinkParser.parse_links(&base(), &HeaderMap::new(), "<html></html>");
        assert!(links.is_empty());
    }

    #[test]
    fn test_malformed_link_objects_are_skipped() {
        let body = r#"{"_links": {"broken": {"title": "no href"}, "ok": {"href": "/ok"}}}"#;
        let links = HalLinkParser.parse_links(&base(), &HeaderMap::new(), body);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].rel, "ok");
    }
}
