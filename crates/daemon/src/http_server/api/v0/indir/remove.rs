use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use common::quota::tree_size;

use crate::http_server::api::v0::auth::Member;
use crate::http_server::api::v0::paths::{entry_path, not_found_as_missing, program_or_default};
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub path: Option<String>,
    pub program: Option<String>,
}

/// Delete a file or a whole directory, releasing its bytes and every
///  link at or below it
pub async fn handler(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Json(request), _): WithRejection<Json<RemoveRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let program = program_or_default(request.program.as_deref());
    let path = entry_path(&state, &account, program, request.path.as_deref())?;

    let meta = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(not_found_as_missing)?;
    let size = if meta.is_dir() {
        let size = tree_size(path.clone()).await?;
        tokio::fs::remove_dir_all(&path).await?;
        size
    } else {
        tokio::fs::remove_file(&path).await?;
        if meta.is_file() {
            meta.len()
        } else {
            0
        }
    };

    state.links().delete_by_path_prefix(&path).await;
    state
        .quota()
        .change_capacity(&account, -(size as i64))
        .await;
    tracing::debug!(account = %account, path = ?path, bytes = size, "removed entry");

    Ok(Json(serde_json::json!({})))
}
