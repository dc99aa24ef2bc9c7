use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;

use chatflow_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Unknown identity: {0}")]
    IdentityNotFound(Uuid),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot modify a deleted message")]
    AlreadyDeleted,

    #[error("Duplicate value: {0}")]
    Conflict(String),

    #[error("Storage unavailable")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("record not found".into()),
            StoreError::Conflict => ServerError::Conflict("unique field already taken".into()),
            other => ServerError::Storage(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthenticated(_) | ServerError::IdentityNotFound(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Validation(_) | ServerError::AlreadyDeleted => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::Storage(_) => {
                // The underlying cause is logged where it happened; clients
                // only see a generic message.
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
