//! Walks a HAL API by following links.
//!
//! This example shows how to:
//! - Start from a root URI and follow links by relation
//! - Read cached representations
//! - Tell plain HTTP errors from problem+json errors
//!
//! Run with: `cargo run --example follow_links -- https://api.example.com/`

use ketting::{Client, Error};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ketting=debug,follow_links=info")
        .init();

    let root = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000/".to_string());
    let client = Client::new(root)?;

    println!("=== Root links ===");
    for link in client.root_resource().links().await? {
        println!("  {} -> {}", link.rel, link.href);
    }
    println!();

    println!("=== Following \"item\" ===");
    for item in client.follow_all("item").await? {
        match item.get().await {
            Ok(representation) => println!(
                "  {} ({}, {} bytes)",
                item.uri(),
                representation.status,
                representation.body.len()
            ),
            Err(Error::Problem(problem)) => {
                println!("  {}: {}", item.uri(), problem);
                if let Some(detail) = &problem.detail {
                    println!("    detail: {}", detail);
                }
            }
            Err(e) => println!("  {}: {} (status {:?})", item.uri(), e, e.status()),
        }
    }
    println!();

    // Served from memory, no second request
    let again = client.root_resource().get().await?;
    println!("Root content type: {:?}", again.content_type());

    Ok(())
}
