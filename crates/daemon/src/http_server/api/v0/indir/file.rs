use axum::extract::{Query, Request, State};
use axum::response::Response;
use axum_extra::extract::WithRejection;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;

use common::reason::ErrorCode;

use super::download::{locate_file, serve_file};
use crate::http_server::api::v0::paths::LocateQuery;
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

/// Types a browser may render inline without executing anything
pub const SAFE_MIME_TYPES: &[&str] = &[
    "text/plain",
    "image/jpeg",
    "image/gif",
    "image/png",
    "image/webp",
    "image/bmp",
    "image/x-icon",
    "video/webm",
    "audio/mpeg",
    "audio/aac",
    "audio/wav",
    "application/json",
    "image/svg+xml",
    "application/pdf",
    "video/mp4",
    "video/x-msvideo",
    "video/quicktime",
    "video/x-matroska",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileQuery {
    #[serde(flatten)]
    pub locate: LocateQuery,
    /// `"true"` serves the bytes as plain text whatever the extension
    pub plain: Option<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    WithRejection(Query(query), _): WithRejection<Query<FileQuery>, ApiError>,
    request: Request,
) -> Result<Response, ApiError> {
    let path = locate_file(&state, &headers, &query.locate).await?;

    let mime = if query.plain.as_deref() == Some("true") {
        "text/plain"
    } else {
        mime_guess::from_path(&path).first_raw().unwrap_or_default()
    };
    if !SAFE_MIME_TYPES.contains(&mime) {
        return Err(ErrorCode::FileUnsafe.into());
    }

    let mut response = serve_file(&path, request).await;
    if let Ok(content_type) = HeaderValue::from_str(&format!("{};charset=utf-8", mime)) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    Ok(response)
}
