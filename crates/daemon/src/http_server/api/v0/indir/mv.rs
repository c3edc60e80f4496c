use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use common::reason::ErrorCode;

use crate::http_server::api::v0::auth::Member;
use crate::http_server::api::v0::paths::{entry_path, metadata, program_or_default};
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MvRequest {
    pub old_path: Option<String>,
    pub old_program: Option<String>,
    pub new_path: Option<String>,
    /// Defaults to `old_program`
    pub new_program: Option<String>,
    #[serde(default)]
    pub keep_public: bool,
}

/// Rename a file or directory, possibly across programs.
///
/// Links below the old path follow the entry when `keep_public` is set
///  and are dropped otherwise. A file overwritten at the destination
///  gives its bytes back and loses its links.
pub async fn handler(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Json(request), _): WithRejection<Json<MvRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let old_program = program_or_default(request.old_program.as_deref());
    let new_program = request
        .new_program
        .as_deref()
        .filter(|program| !program.is_empty())
        .unwrap_or(old_program);
    let old_path = entry_path(&state, &account, old_program, request.old_path.as_deref())?;
    let new_path = entry_path(&state, &account, new_program, request.new_path.as_deref())?;

    metadata(&old_path).await?;
    if old_path == new_path {
        return Ok(Json(serde_json::json!({})));
    }
    let parent = new_path.parent().ok_or(ErrorCode::NotExists)?;
    if !metadata(parent).await?.is_dir() {
        return Err(ErrorCode::NotExists.into());
    }

    let overwritten = match tokio::fs::symlink_metadata(&new_path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    };
    tokio::fs::rename(&old_path, &new_path).await?;

    if overwritten > 0 {
        state
            .quota()
            .change_capacity(&account, -(overwritten as i64))
            .await;
    }
    state.links().delete_by_path_prefix(&new_path).await;
    if request.keep_public {
        state.links().rename_path_prefix(&old_path, &new_path).await;
    } else {
        state.links().delete_by_path_prefix(&old_path).await;
    }

    Ok(Json(serde_json::json!({})))
}
