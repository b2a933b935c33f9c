//! Interactive chat with one peer.

use anyhow::{Context, Result};
use chat_client::{ChatClient, ChatConfig, ChatSession, KeyDirectoryClient, KeyPair, WsTransport};
use std::path::Path;

use crate::config::{KeyPaths, Profile};

/// Run the chat command on stdin/stdout.
pub async fn run(data_dir: &Path, peer: &str) -> Result<()> {
    let profile = Profile::load(data_dir).await?;
    if peer == profile.username {
        anyhow::bail!("Cannot chat with yourself");
    }
    let keys = load_keys(data_dir, &profile.username).await?;

    let peer_key = KeyDirectoryClient::new(&profile.server)
        .public_key(peer)
        .await
        .with_context(|| format!("Failed to fetch public key for {peer}"))?;
    tracing::debug!(%peer, "fetched peer public key");

    let config = ChatConfig::new(&profile.username, &profile.server, &profile.token);
    let client = ChatClient::new(config, WsTransport::new(&profile.token), keys);
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", profile.server))?;
    tracing::info!(username = %profile.username, %peer, "chat session started");

    let session = ChatSession::new(client, peer, peer_key);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    session.run(stdin, tokio::io::stdout()).await?;
    Ok(())
}

/// Load the user's private key from the keys directory.
pub async fn load_keys(data_dir: &Path, username: &str) -> Result<KeyPair> {
    let paths = KeyPaths::for_user(data_dir, username);
    tracing::debug!(path = %paths.private.display(), "loading private key");
    let pem = tokio::fs::read_to_string(&paths.private)
        .await
        .with_context(|| {
            format!(
                "No private key at {}. Run 'pairchat keygen --username {username}'.",
                paths.private.display()
            )
        })?;
    Ok(KeyPair::from_private_pem(&pem)?)
}
