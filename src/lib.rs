//! # Ketting - a hypermedia HTTP client
//!
//! Ketting models a REST API as a graph of resources connected by links. You start
//! at a root URI, follow links by relation name, and read or change the resources
//! you reach. Credentials are attached to every request, and failed requests come
//! back as typed errors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ketting::{auth::AuthConfig, Client};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Article {
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ketting::Error> {
//!     let auth: AuthConfig = serde_json::from_str(r#"{
//!         "type": "oauth2",
//!         "client": {
//!             "clientId": "my-app",
//!             "clientSecret": "s3cret",
//!             "accessTokenUri": "https://auth.example.com/token",
//!             "scopes": ["articles"]
//!         }
//!     }"#).unwrap();
//!
//!     let client = Client::builder()
//!         .root_uri("https://api.example.com/")?
//!         .auth(auth)
//!         .build()?;
//!
//!     // GET / (after fetching a token), then resolve the "latest" link
//!     let latest = client.follow("latest").await?;
//!     let article: Article = latest.get().await?.json()?;
//!     println!("Latest article: {}", article.title);
//!
//!     // Mutations drop the cached representation
//!     latest.patch(&serde_json::json!({ "title": "Updated" })).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Caching
//!
//! Each [`Client`] keeps one [`Resource`] per URI. A resource caches the
//! representation of its last successful `get`; later `get`s are served from
//! memory until `put`, `post`, `patch` or `delete` succeed, or until
//! [`Resource::refresh`] is called. A successful `delete` also removes the resource
//! from the client, so looking the URI up again starts from scratch.
//!
//! ## Authentication
//!
//! [`auth::AuthConfig`] selects `none`, `basic` or `oauth2`. With OAuth2 a token
//! is fetched on first use (password grant when `owner` is set, client credentials
//! otherwise). When the server answers 401, the token is refreshed and the request
//! replayed once; a second 401 is reported as [`Error::Authentication`].
//!
//! ## Error Handling
//!
//! ```no_run
//! use ketting::{Client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::new("https://api.example.com/")?;
//! match client.follow("order").await?.delete().await {
//!     Ok(_) => println!("Deleted"),
//!     Err(Error::Problem(problem)) => {
//!         // application/problem+json
//!         eprintln!("{} (type {:?})", problem, problem.problem_type);
//!     }
//!     Err(e) => eprintln!("Failed with status {:?}: {}", e.status(), e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod client;
mod error;
pub mod link;
pub mod metadata;
pub mod problem;
mod representation;
mod resource;
mod response;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use error::{BoxError, Error, Result};
pub use link::Link;
pub use problem::Problem;
pub use representation::Representation;
pub use resource::{LastError, Resource, ResourceState};
pub use response::Response;
