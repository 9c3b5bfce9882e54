//! Talks to an OAuth2-protected API.
//!
//! Reads the client configuration from the `KETTING_AUTH` environment variable,
//! for example:
//!
//! ```text
//! KETTING_AUTH='{"type":"oauth2","client":{"clientId":"fooClient","clientSecret":"barSecret",
//!   "accessTokenUri":"http://localhost:3000/oauth-token","scopes":["test"]}}'
//! ```
//!
//! Run with: `cargo run --example oauth2_client -- http://localhost:3000/`

use ketting::auth::{AuthConfig, TokenState};
use ketting::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ketting=debug,oauth2_client=info")
        .init();

    let root = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000/".to_string());
    let auth: AuthConfig = match std::env::var("KETTING_AUTH") {
        Ok(raw) => serde_json::from_str(&raw)?,
        Err(_) => AuthConfig::None,
    };

    let client = Client::builder().root_uri(root)?.auth(auth).build()?;
    println!("Auth strategy: {}", client.auth().kind());

    let response = client.root_resource().fetch().await?;
    println!("GET {} -> {}", client.root_uri(), response.status);
    if response.was_retried() {
        println!("The token was refreshed and the request replayed");
    }

    if let Some(helper) = client.oauth2_helper() {
        match helper.token_state().await {
            TokenState::HasToken(token) => println!(
                "Holding a {} token, refresh token present: {}",
                token.token_type(),
                token.refresh_token().is_some()
            ),
            state => println!("Token state: {:?}", state),
        }
    }

    Ok(())
}
