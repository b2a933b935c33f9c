//! chat-relay binary entry point.
//!
//! Usage:
//! ```bash
//! chat-relay --config relay.toml            # serve
//! chat-relay add-user alice --public-key alice_public.pem
//! chat-relay pair alice bob                 # accepted connection
//! chat-relay issue-token alice <token>
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pairchat_relay::config::Config;
use pairchat_relay::http::{build_router, health};
use pairchat_relay::server::ChatRelay;
use pairchat_relay::storage::{IdentityService, SqliteStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Relay server for pairchat.
#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults apply if `relay.toml` is absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay (default)
    Serve,

    /// Register a user and their public key
    AddUser {
        /// Handle
        username: String,
        /// PEM file with the user's public key
        #[arg(long)]
        public_key: PathBuf,
    },

    /// Create an accepted connection between two users
    Pair {
        /// Requesting side
        requester: String,
        /// Accepting side
        responder: String,
    },

    /// Bind a session token to a user
    IssueToken {
        /// Handle
        username: String,
        /// Token the client presents as `Authorization: Bearer`
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("invalid logging.filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let storage = SqliteStorage::new(&config.storage.database)
        .await
        .with_context(|| format!("failed to open {}", config.storage.database.display()))?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, storage).await,
        Commands::AddUser {
            username,
            public_key,
        } => {
            let pem = std::fs::read_to_string(&public_key)
                .with_context(|| format!("failed to read {}", public_key.display()))?;
            let id = storage.create_user(&username, &pem).await?;
            println!("Created user {username} (id {id})");
            Ok(())
        }
        Commands::Pair {
            requester,
            responder,
        } => {
            let a = resolve(&storage, &requester).await?;
            let b = resolve(&storage, &responder).await?;
            storage.request_connection(a, b).await?;
            if !storage.accept_connection(a, b).await? {
                bail!("no pending request from {requester} to {responder}");
            }
            println!("Paired {requester} and {responder}");
            Ok(())
        }
        Commands::IssueToken { username, token } => {
            let id = resolve(&storage, &username).await?;
            storage.insert_session_token(&token, id).await?;
            println!("Token bound to {username}");
            Ok(())
        }
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<Config> {
    match explicit {
        Some(path) => Ok(Config::from_file(path)?),
        None => {
            let default = PathBuf::from("relay.toml");
            if default.exists() {
                Ok(Config::from_file(&default)?)
            } else {
                Ok(Config::default())
            }
        }
    }
}

async fn resolve(storage: &SqliteStorage, username: &str) -> Result<chat_types::UserId> {
    storage
        .resolve_identity(username)
        .await?
        .with_context(|| format!("unknown user {username}"))
}

async fn serve(config: Config, storage: SqliteStorage) -> Result<()> {
    let bind = config.server.bind_address.clone();
    let relay = Arc::new(ChatRelay::new(config, storage));
    health::init_start_time();

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(address = %bind, "chat-relay listening");

    axum::serve(listener, build_router(relay.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    relay.shutdown().await;
    tracing::info!("chat-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
