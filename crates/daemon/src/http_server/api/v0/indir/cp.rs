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
pub struct CpRequest {
    pub current_path: Option<String>,
    pub current_program: Option<String>,
    pub new_path: Option<String>,
    pub new_program: Option<String>,
    #[serde(default)]
    pub keep_public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nid: Option<String>,
}

/// Copy a single file. The copy is charged against the quota like an
///  upload of the same size.
pub async fn handler(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Json(request), _): WithRejection<Json<CpRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let current_program = program_or_default(request.current_program.as_deref());
    let new_program = program_or_default(request.new_program.as_deref());
    let source = entry_path(
        &state,
        &account,
        current_program,
        request.current_path.as_deref(),
    )?;
    let destination = entry_path(&state, &account, new_program, request.new_path.as_deref())?;

    let source_meta = metadata(&source).await?;
    if !source_meta.is_file() {
        return Err(ErrorCode::NotExists.into());
    }
    let parent = destination.parent().ok_or(ErrorCode::NotExists)?;
    if !metadata(parent).await?.is_dir() {
        return Err(ErrorCode::NotExists.into());
    }
    let overwritten = match tokio::fs::symlink_metadata(&destination).await {
        Ok(meta) if meta.is_dir() => return Err(ErrorCode::UnavailablePath.into()),
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    };
    if source == destination {
        return Ok(Json(CpResponse::default()));
    }

    if !state.quota().admits(&account, source_meta.len()).await {
        return Err(ErrorCode::TooBigSize.into());
    }
    let copied = tokio::fs::copy(&source, &destination).await?;
    state
        .quota()
        .change_capacity(&account, copied as i64 - overwritten as i64)
        .await;

    let mut response = CpResponse::default();
    if request.keep_public {
        match state.links().create(&account, &destination).await {
            Ok(nid) => response.nid = Some(nid),
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "failed to share copied file")
            }
        }
    }

    Ok(Json(response))
}
