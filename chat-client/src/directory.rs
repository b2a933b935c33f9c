//! HTTP client for the relay's key directory.

use crate::crypto::{public_key_from_pem, CodecError};
use chat_types::{ErrorKind, KeyRecord};
use reqwest::StatusCode;
use rsa::RsaPublicKey;
use thiserror::Error;

/// Key directory lookup errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No user with that handle.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Request failed or the relay answered with an unexpected status.
    #[error("directory request failed: {0}")]
    Request(String),

    /// The published key could not be parsed.
    #[error("invalid published key: {0}")]
    Key(#[from] CodecError),
}

impl DirectoryError {
    /// Taxonomy classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownUser(_) => ErrorKind::NotFound,
            Self::Request(_) => ErrorKind::TransportError,
            Self::Key(e) => e.kind(),
        }
    }
}

/// Fetches published public keys from `GET {base}/users/{username}/key`.
#[derive(Debug, Clone)]
pub struct KeyDirectoryClient {
    base_url: String,
    http: reqwest::Client,
}

impl KeyDirectoryClient {
    /// Client for the relay at `base_url` (an `http`/`https` URL).
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Fetch the raw record for `username`.
    pub async fn fetch_record(&self, username: &str) -> Result<KeyRecord, DirectoryError> {
        let url = format!("{}/users/{}/key", self.base_url, username);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<KeyRecord>()
                .await
                .map_err(|e| DirectoryError::Request(e.to_string())),
            StatusCode::NOT_FOUND => Err(DirectoryError::UnknownUser(username.to_string())),
            status => Err(DirectoryError::Request(format!("unexpected status {status}"))),
        }
    }

    /// Fetch and parse the public key for `username`.
    pub async fn public_key(&self, username: &str) -> Result<RsaPublicKey, DirectoryError> {
        let record = self.fetch_record(username).await?;
        tracing::debug!(username = %record.username, "fetched public key");
        Ok(public_key_from_pem(&record.public_key)?)
    }
}
