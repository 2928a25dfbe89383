//! Error types shared by the storage, gateway, admin and REST layers.
//!
//! Reads and writes both return `Result`, so an empty list always means "no data"
//! and never "the store failed".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("version conflict on {entity} {id}: expected {expected}, found {found}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("invalid {0}")]
    Invalid(String),

    #[error("blob storage error: {0}")]
    Blob(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email {0} is already registered")]
    EmailTaken(String),

    #[error("missing or malformed bearer token")]
    MissingToken,

    #[error("admin role required")]
    Forbidden,

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// An HTTP-facing error: a status plus the message the user is allowed to see.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Maps a failed read. Not-found gets its own message; anything else is a 500.
    pub fn read_failed(what: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                tracing::warn!(entity, id = %id, "lookup found nothing");
                Self::new(StatusCode::NOT_FOUND, format!("{} not found", capitalize(entity)))
            }
            other => {
                tracing::error!(error = %other, "failed to load {}", what);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to load {}. Please try again.", what),
                )
            }
        }
    }

    /// Maps a failed write to the admin-facing "Failed to save X" message.
    pub fn write_failed(what: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                tracing::warn!(entity, id = %id, "write target missing");
                Self::new(StatusCode::NOT_FOUND, format!("{} not found", capitalize(entity)))
            }
            StoreError::Conflict { .. } => {
                tracing::warn!(error = %err, "rejected stale write");
                Self::new(
                    StatusCode::CONFLICT,
                    format!("{} was changed by someone else. Reload and try again.", capitalize(what)),
                )
            }
            StoreError::Invalid(reason) => Self::bad_request(reason),
            other => {
                tracing::error!(error = %other, "failed to save {}", what);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to save {}. Please try again.", what),
                )
            }
        }
    }

    pub fn delete_failed(what: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => {
                Self::new(StatusCode::NOT_FOUND, format!("{} not found", capitalize(entity)))
            }
            other => {
                tracing::error!(error = %other, "failed to delete {}", what);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to delete {}. Please try again.", what),
                )
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::new(StatusCode::UNAUTHORIZED, err.to_string()),
            AuthError::MissingToken | AuthError::Token(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "Invalid or expired token")
            }
            AuthError::Forbidden => Self::new(StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::EmailTaken(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            AuthError::Hash(_) | AuthError::Store(_) => {
                tracing::error!(error = %err, "auth backend failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Authentication failed. Please try again.",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_generic_failure_have_distinct_messages() {
        let missing = ApiError::read_failed("villa", StoreError::not_found("villa", "v1"));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.message, "Villa not found");

        let broken = ApiError::write_failed("villa data", StoreError::Blob("disk full".into()));
        assert_eq!(broken.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.message, "Failed to save villa data. Please try again.");
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = StoreError::Conflict {
            entity: "offer",
            id: "o1".into(),
            expected: 1,
            found: 2,
        };
        assert_eq!(ApiError::write_failed("offer", err).status, StatusCode::CONFLICT);
    }

    #[test]
    fn auth_errors_map_to_http_statuses() {
        assert_eq!(ApiError::from(AuthError::Forbidden).status, StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(AuthError::MissingToken).status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(AuthError::EmailTaken("a@b.c".into())).status,
            StatusCode::CONFLICT
        );
    }
}
