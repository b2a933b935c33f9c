//! # pairchat
//!
//! Command-line client for pairchat end-to-end encrypted chat.
//!
//! ## Commands
//!
//! - `init`: Create the local profile and keypair
//! - `keygen`: (Re)generate a keypair
//! - `chat`: Chat with a peer
//! - `status`: Show profile status
//!
//! ## Example
//!
//! ```bash
//! # Initialize (prompts for the session token)
//! pairchat init --username alice --server http://relay:8080
//!
//! # Chat with bob
//! pairchat chat bob
//! ```

use anyhow::{Context, Result};
use chat_client::DEFAULT_KEY_BITS;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{chat, init, keygen, status};

/// Command-line client for pairchat.
#[derive(Parser, Debug)]
#[command(name = "pairchat")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the profile and key files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the local profile and keypair
    Init {
        /// Your handle on the relay
        #[arg(long, short)]
        username: String,

        /// Relay base URL, e.g. http://relay:8080
        #[arg(long, short)]
        server: String,

        /// Session token (will prompt if not provided)
        #[arg(long, short)]
        token: Option<String>,

        /// RSA key size for a new keypair
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
    },

    /// (Re)generate a keypair
    Keygen {
        /// Handle the keys belong to
        #[arg(long, short)]
        username: String,

        /// RSA key size
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
    },

    /// Chat with a peer
    Chat {
        /// Peer handle
        peer: String,
    },

    /// Show profile status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Init {
            username,
            server,
            token,
            bits,
        } => {
            init::run(&data_dir, &username, &server, token.as_deref(), bits).await?;
        }
        Commands::Keygen { username, bits } => {
            keygen::run(&data_dir, &username, bits).await?;
        }
        Commands::Chat { peer } => {
            chat::run(&data_dir, &peer).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for pairchat.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "pairchat", "pairchat")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
