//! Local profile and key file layout.
//!
//! ```text
//! <data-dir>/
//!   profile.json          (0600)
//!   keys/                 (0700)
//!     <user>_private.pem  (0600)
//!     <user>_public.pem
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const PROFILE_FILE: &str = "profile.json";
const KEYS_DIR: &str = "keys";

/// Client profile stored locally.
#[derive(Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Local handle.
    pub username: String,
    /// Relay base URL.
    pub server: String,
    /// Session token issued by the relay operator.
    pub token: String,
    /// When the profile was created (unix seconds).
    pub created_at: u64,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("username", &self.username)
            .field("server", &self.server)
            .field("token", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Profile {
    /// Create a new profile.
    pub fn new(username: &str, server: &str, token: &str) -> Self {
        Self {
            username: username.to_string(),
            server: server.trim_end_matches('/').to_string(),
            token: token.to_string(),
            created_at: unix_now(),
        }
    }

    /// Load the profile from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(PROFILE_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Profile not initialized. Run 'pairchat init' first.")?;
        serde_json::from_str(&contents).context("Invalid profile")
    }

    /// Save the profile to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(PROFILE_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save profile")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if a profile exists.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join(PROFILE_FILE).exists()
    }
}

/// Paths of a user's key files.
#[derive(Debug, Clone)]
pub struct KeyPaths {
    /// PKCS#1 private key PEM.
    pub private: PathBuf,
    /// SPKI public key PEM.
    pub public: PathBuf,
}

impl KeyPaths {
    /// Key file locations for `username` under `data_dir`.
    pub fn for_user(data_dir: &Path, username: &str) -> Self {
        let dir = data_dir.join(KEYS_DIR);
        Self {
            private: dir.join(format!("{username}_private.pem")),
            public: dir.join(format!("{username}_public.pem")),
        }
    }

    /// Both key files are present.
    pub fn exist(&self) -> bool {
        self.private.exists() && self.public.exists()
    }
}

/// Create `<data-dir>/keys` owner-only.
pub async fn ensure_keys_dir(data_dir: &Path) -> Result<PathBuf> {
    let dir = data_dir.join(KEYS_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .context("Failed to create keys directory")?;
    set_dir_permissions_0700(&dir).await?;
    Ok(dir)
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
