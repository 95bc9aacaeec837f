//! Minimal broadcast chat server.
//!
//! Run with `cargo run --example chat`, then point any hixie-75/76 client at
//! `ws://127.0.0.1:8000/chat`. Every message fans out to the other clients.

use anyhow::Result;
use tracing::{info, warn};

use hixie::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = Server::new(ServerConfig::builder().build());
    let mut events = server.events().expect("events taken once");
    let addr = server.listen("127.0.0.1:8000").await?;
    info!(%addr, "chat server listening");

    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::Connection(id) => {
                info!(%id, "joined");
                server.broadcast(&format!("* {id} joined")).await;
            }
            ServerEvent::Message { id, text } => {
                server.broadcast(&format!("{id}: {text}")).await;
            }
            ServerEvent::Close(id) => {
                info!(%id, "left");
                server.broadcast(&format!("* {id} left")).await;
            }
            ServerEvent::Rejected { id, reason } => warn!(%id, %reason, "rejected"),
            ServerEvent::ClientError(error) => warn!(%error, "bad request"),
            ServerEvent::Error { id, error } => warn!(%id, %error, "socket error"),
            ServerEvent::Timeout(id) => info!(%id, "idle"),
        }
    }
    Ok(())
}
