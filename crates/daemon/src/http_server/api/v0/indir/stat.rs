use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::WithRejection;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use common::reason::ErrorCode;

use crate::http_server::api::v0::paths::{locate, metadata, times, LocateQuery};
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatResponse {
    pub is_dir: bool,
    /// File length; 0 for directories
    pub size: u64,
    pub mtime_ms: u64,
    pub birthtime_ms: u64,
}

pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    WithRejection(Query(query), _): WithRejection<Query<LocateQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let path = locate(&state, &headers, &query, ErrorCode::NotExists).await?;
    let meta = metadata(&path).await?;
    let (mtime_ms, birthtime_ms) = times(&meta);

    Ok(Json(StatResponse {
        is_dir: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        mtime_ms,
        birthtime_ms,
    }))
}
