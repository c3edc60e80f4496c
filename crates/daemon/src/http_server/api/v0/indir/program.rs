use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use common::quota::tree_size;
use common::reason::ErrorCode;

use crate::http_server::api::v0::auth::Member;
use crate::http_server::api::v0::paths::metadata;
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramRequest {
    pub program: Option<String>,
}

pub async fn create(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Json(request), _): WithRejection<Json<ProgramRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let program = request.program.as_deref().unwrap_or_default();
    if !state.sandbox().validate_program_name(program) {
        return Err(ErrorCode::UnavailableProgram.into());
    }

    let root = state.sandbox().program_root(&account, program);
    if tokio::fs::try_exists(&root).await? {
        return Err(ErrorCode::AlreadyCreatedProgram.into());
    }
    tokio::fs::create_dir_all(&root).await?;
    tracing::info!(account = %account, program, "program created");

    Ok(Json(serde_json::json!({})))
}

/// Drop a program with everything in it, releasing its bytes and links
pub async fn remove(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Json(request), _): WithRejection<Json<ProgramRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let program = request.program.as_deref().unwrap_or_default();
    if !state.sandbox().validate_program_name(program) {
        return Err(ErrorCode::UnavailableProgram.into());
    }

    let root = state.sandbox().program_root(&account, program);
    if !metadata(&root).await?.is_dir() {
        return Err(ErrorCode::NotExists.into());
    }
    let size = tree_size(root.clone()).await?;

    state.links().delete_by_path_prefix(&root).await;
    tokio::fs::remove_dir_all(&root).await?;
    state
        .quota()
        .change_capacity(&account, -(size as i64))
        .await;
    tracing::info!(account = %account, program, bytes = size, "program removed");

    Ok(Json(serde_json::json!({})))
}
