//! Show profile status.

use anyhow::Result;
use std::path::Path;

use crate::config::{unix_now, KeyPaths, Profile};

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    println!("=== pairchat status ===");
    println!();

    let profile = match Profile::load(data_dir).await {
        Ok(profile) => profile,
        Err(_) => {
            println!("Profile: NOT INITIALIZED");
            println!();
            println!("Run 'pairchat init --username <name> --server <url>' to initialize.");
            return Ok(());
        }
    };

    println!("Profile:");
    println!("  Username: {}", profile.username);
    println!("  Server:   {}", profile.server);
    println!("  Token:    {}", mask_token(&profile.token));
    println!("  Init:     {}", format_timestamp(profile.created_at));
    println!();

    let paths = KeyPaths::for_user(data_dir, &profile.username);
    println!("Keys:");
    println!("  Private: {}", presence(&paths.private));
    println!("  Public:  {}", presence(&paths.public));
    if !paths.exist() {
        println!();
        println!(
            "Run 'pairchat keygen --username {}' to generate keys.",
            profile.username
        );
    }

    Ok(())
}

fn presence(path: &Path) -> String {
    if path.exists() {
        format!("present ({})", path.display())
    } else {
        "MISSING".to_string()
    }
}

/// Show only the last four characters.
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

/// Format a Unix timestamp as a human-readable string.
fn format_timestamp(ts: u64) -> String {
    let diff = unix_now().saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
