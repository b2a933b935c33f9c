//! Public key directory endpoint.

use crate::server::ChatRelay;
use crate::storage::KeyDirectory;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chat_types::{ErrorKind, KeyRecord};
use std::sync::Arc;

/// `GET /users/:username/key`
pub async fn public_key_handler(
    Extension(relay): Extension<Arc<ChatRelay>>,
    Path(username): Path<String>,
) -> Response {
    match relay.storage().public_key_for(&username).await {
        Ok(Some(public_key)) => Json(KeyRecord {
            username,
            public_key,
        })
        .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "unknown user").into_response(),
        Err(e) => {
            tracing::error!(
                kind = ErrorKind::PersistenceError.as_str(),
                user = %username,
                error = %e,
                "key lookup failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
