use std::path::Path;

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::response::Response;
use axum_extra::extract::WithRejection;
use http::header::CONTENT_DISPOSITION;
use http::{HeaderMap, HeaderValue};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use common::reason::ErrorCode;

use crate::http_server::api::v0::paths::{locate, LocateQuery};
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

/// Send the file at `path` back for `request`, honoring range and
///  conditional headers
pub async fn serve_file(path: &Path, request: Request) -> Response {
    ServeFile::new(path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {})
        .map(Body::new)
}

/// Resolve a read request to an existing regular file
pub async fn locate_file(
    state: &ServiceState,
    headers: &HeaderMap,
    query: &LocateQuery,
) -> Result<std::path::PathBuf, ApiError> {
    let path = locate(state, headers, query, ErrorCode::NotExists).await?;
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(ErrorCode::NotExists.into()),
    }
}

pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    WithRejection(Query(query), _): WithRejection<Query<LocateQuery>, ApiError>,
    request: Request,
) -> Result<Response, ApiError> {
    let path = locate_file(&state, &headers, &query).await?;

    let mut response = serve_file(&path, request).await;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download");
    if let Ok(disposition) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)) {
        response.headers_mut().insert(CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}
