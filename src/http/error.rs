use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::AssetStoreError;

/// API error with HTTP status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            code: "NOT_FOUND".to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
            code: "UNAUTHORIZED".to_string(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
            code: "FORBIDDEN".to_string(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: "INTERNAL_SERVER_ERROR".to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
            code: "CONFLICT".to_string(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
            code: "BAD_GATEWAY".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "code": self.code,
            }
        }));

        (self.status, body).into_response()
    }
}

/// Convert anyhow::Error to ApiError
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal_error(err.to_string())
    }
}

impl From<AssetStoreError> for ApiError {
    fn from(err: AssetStoreError) -> Self {
        match err {
            AssetStoreError::Unauthorized => ApiError::unauthorized(err.to_string()),
            AssetStoreError::Forbidden => ApiError::forbidden(err.to_string()),
            AssetStoreError::FolderNotFound(_)
            | AssetStoreError::AssetNotFound(_)
            | AssetStoreError::VersionNotFound(_)
            | AssetStoreError::IntentNotFound(_) => ApiError::not_found(err.to_string()),
            AssetStoreError::FolderExists(_)
            | AssetStoreError::AssetExists { .. }
            | AssetStoreError::IntentConsumed(_) => ApiError::conflict(err.to_string()),
            AssetStoreError::InvalidPath(_)
            | AssetStoreError::InvalidBasename(_)
            | AssetStoreError::InvalidUploadResponse(_)
            | AssetStoreError::BasenameTooLong(_)
            | AssetStoreError::ParentMissing(_) => ApiError::bad_request(err.to_string()),
            AssetStoreError::BackendFailure { .. } => ApiError::bad_gateway(err.to_string()),
            AssetStoreError::Transient(_) => ApiError::internal_error(err.to_string()),
            AssetStoreError::Internal(_) => ApiError::internal_error(err.to_string()),
        }
    }
}
