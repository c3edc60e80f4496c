use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::WithRejection;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use common::reason::ErrorCode;

use crate::http_server::api::v0::paths::{locate, not_found_as_missing, times, LocateQuery};
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub mtime_ms: u64,
    pub birthtime_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaddirResponse {
    pub in_dir: Vec<Entry>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    WithRejection(Query(query), _): WithRejection<Query<LocateQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let dir = locate(&state, &headers, &query, ErrorCode::UnavailableNid).await?;

    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(&dir)
        .await
        .map_err(not_found_as_missing)?;
    while let Some(entry) = read_dir.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = ?entry.path(), "skipping non utf-8 entry");
            continue;
        };
        // follows links, so a dangling one is skipped rather than failing the listing
        let meta = match tokio::fs::metadata(entry.path()).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!(path = ?entry.path(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let (mtime_ms, birthtime_ms) = times(&meta);
        entries.push(Entry {
            name,
            is_dir: meta.is_dir(),
            mtime_ms,
            birthtime_ms,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(ReaddirResponse { in_dir: entries }))
}
