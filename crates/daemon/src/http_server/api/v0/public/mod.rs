use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use common::reason::ErrorCode;

use super::auth::Member;
use super::paths::{account_path, metadata, program_or_default};
use super::ApiError;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", post(create).delete(remove))
        .route("/dir", get(dir))
        .with_state(state)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareQuery {
    pub path: Option<String>,
    pub program: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NidQuery {
    pub nid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareResponse {
    pub nid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirResponse {
    pub dir: String,
}

/// Share an existing file or directory
pub async fn create(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Query(query), _): WithRejection<Query<ShareQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let program = program_or_default(query.program.as_deref());
    let path = account_path(&state, &account, program, query.path.as_deref())?;
    metadata(&path).await?;

    let nid = state.links().create(&account, &path).await.map_err(|e| {
        tracing::warn!(account = %account, error = %e, "failed to create public link");
        ErrorCode::UnknownError
    })?;
    Ok(Json(ShareResponse { nid }))
}

pub async fn remove(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Query(query), _): WithRejection<Query<NidQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let nid = query
        .nid
        .as_deref()
        .filter(|nid| !nid.is_empty())
        .ok_or(ErrorCode::UnavailableNid)?;
    if !state.links().delete_by_token(&account, nid).await {
        return Err(ErrorCode::UnavailableNid.into());
    }
    Ok(Json(serde_json::json!({})))
}

/// Where one of the caller's links points, relative to the account root
pub async fn dir(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Query(query), _): WithRejection<Query<NidQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let nid = query
        .nid
        .as_deref()
        .filter(|nid| !nid.is_empty())
        .ok_or(ErrorCode::UnavailableNid)?;
    let link = state
        .links()
        .resolve_link(nid)
        .await
        .filter(|link| link.account == account)
        .ok_or(ErrorCode::UnavailableNid)?;

    let account_root = state.sandbox().account_root(&account);
    let dir = link
        .target()
        .strip_prefix(&account_root)
        .map(|relative| format!("/{}", relative.to_string_lossy()))
        .map_err(|_| ErrorCode::UnavailableNid)?;
    Ok(Json(DirResponse { dir }))
}
