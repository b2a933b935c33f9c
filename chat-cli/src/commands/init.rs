//! Initialize the local profile and keypair.

use anyhow::{Context, Result};
use std::path::Path;

use super::keygen::write_keypair;
use crate::config::{KeyPaths, Profile};

/// Run the init command.
pub async fn run(
    data_dir: &Path,
    username: &str,
    server: &str,
    token: Option<&str>,
    bits: usize,
) -> Result<()> {
    if Profile::exists(data_dir).await {
        anyhow::bail!(
            "Profile already initialized. Delete {} to reinitialize.",
            data_dir.join("profile.json").display()
        );
    }
    if username.trim().is_empty() {
        anyhow::bail!("Username must not be empty");
    }

    let token = match token {
        Some(t) => t.to_string(),
        None => prompt_token(&format!("Session token for {username}: "))?,
    };
    if token.trim().is_empty() {
        anyhow::bail!("Session token must not be empty");
    }

    let profile = Profile::new(username, server, token.trim());
    profile.save(data_dir).await?;
    tracing::debug!(username = %profile.username, server = %profile.server, "profile saved");

    let mut paths = KeyPaths::for_user(data_dir, username);
    let generated = !paths.exist();
    if generated {
        paths = write_keypair(data_dir, username, bits).await?;
    } else {
        tracing::info!(%username, "keeping existing keypair");
    }

    println!("Profile initialized successfully!");
    println!();
    println!("  Username: {}", profile.username);
    println!("  Server:   {}", profile.server);
    println!("  Data dir: {}", data_dir.display());
    if generated {
        println!("  Keys:     generated ({bits} bits)");
    } else {
        println!("  Keys:     existing keys kept");
    }
    println!();
    println!("Next steps:");
    println!(
        "  1. Register your public key: chat-relay add-user {username} --public-key {}",
        paths.public.display()
    );
    println!("  2. Start chatting: pairchat chat <peer>");

    Ok(())
}

fn prompt_token(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read session token")
}
