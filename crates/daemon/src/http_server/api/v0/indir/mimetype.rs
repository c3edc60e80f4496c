use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::WithRejection;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::download::locate_file;
use crate::http_server::api::v0::paths::LocateQuery;
use crate::http_server::api::v0::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MimetypeResponse {
    pub mime_type: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    WithRejection(Query(query), _): WithRejection<Query<LocateQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let path = locate_file(&state, &headers, &query).await?;
    let mime_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok(Json(MimetypeResponse { mime_type }))
}
