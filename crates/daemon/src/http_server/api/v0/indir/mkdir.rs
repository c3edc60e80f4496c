use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use common::reason::ErrorCode;

use crate::http_server::api::v0::auth::Member;
use crate::http_server::api::v0::paths::program_or_default;
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MkdirRequest {
    pub dir: Option<String>,
    pub program: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub to_public: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MkdirResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nid: Option<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Member(account): Member,
    WithRejection(Json(request), _): WithRejection<Json<MkdirRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let sandbox = state.sandbox();
    let dir = request.dir.as_deref().ok_or(ErrorCode::UnavailableDirectory)?;
    let program = program_or_default(request.program.as_deref());
    if !sandbox.validate_program_name(program) {
        return Err(ErrorCode::UnavailableProgram.into());
    }
    let name = request
        .name
        .as_deref()
        .filter(|name| sandbox.validate_indir_name(name))
        .ok_or(ErrorCode::UnavailableName)?;

    let parent = sandbox.resolve(&account, program, dir);
    if !sandbox.validate_directory(&account, program, &parent) {
        return Err(ErrorCode::UnavailableDirectory.into());
    }
    let path = parent.join(name);
    if !sandbox.validate_path(&account, program, &path) {
        return Err(ErrorCode::UnavailablePath.into());
    }

    if tokio::fs::try_exists(&path).await? {
        return Err(ErrorCode::AlreadyCreatedDirectory.into());
    }
    tokio::fs::create_dir(&path).await?;

    let mut response = MkdirResponse::default();
    if request.to_public {
        match state.links().create(&account, &path).await {
            Ok(nid) => response.nid = Some(nid),
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "failed to share new directory")
            }
        }
    }

    Ok(Json(response))
}
