use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use common::reason::ErrorCode;

/// Body of every rejected request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub reason: ErrorCode,
}

/// Error shared by the v0 handlers. Every variant answers
///  `400 {"reason": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request rejected: {0}")]
    Rejected(ErrorCode),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn reason(&self) -> ErrorCode {
        match self {
            ApiError::Rejected(code) => *code,
            ApiError::Io(_) => ErrorCode::UnknownError,
            ApiError::Malformed(_) => ErrorCode::BadRequest,
        }
    }
}

impl From<ErrorCode> for ApiError {
    fn from(code: ErrorCode) -> Self {
        ApiError::Rejected(code)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Rejected(code) => tracing::debug!(reason = %code, "request rejected"),
            ApiError::Io(e) => tracing::error!(error = %e, "filesystem operation failed"),
            ApiError::Malformed(detail) => tracing::debug!(detail = %detail, "malformed request"),
        }
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                reason: self.reason(),
            }),
        )
            .into_response()
    }
}
