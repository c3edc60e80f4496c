use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use common::reason::ErrorCode;

use crate::http_server::api::v0::ErrorBody;

pub async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            reason: ErrorCode::BadRequest,
        }),
    )
        .into_response()
}
