use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use common::reason::ErrorCode;
use common::sandbox::DEFAULT_PROGRAM;
use common::store::{MetadataStore, StoreError};

use super::auth::Caller;
use super::ApiError;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub registered: bool,
}

pub async fn status(
    State(state): State<ServiceState>,
    Caller(account): Caller,
) -> Result<impl IntoResponse, ApiError> {
    let registered = state
        .database()
        .is_registered(&account)
        .await
        .map_err(|e| {
            tracing::warn!(account = %account, error = %e, "failed to check registration");
            ErrorCode::UnknownError
        })?;

    Ok(Json(RegisteredResponse { registered }))
}

/// Create the account tree with its default program and record the
///  registration
pub async fn handler(
    State(state): State<ServiceState>,
    Caller(account): Caller,
) -> Result<impl IntoResponse, ApiError> {
    // the id becomes a directory name
    if !state.sandbox().validate_indir_name(account.as_str()) {
        return Err(ErrorCode::UnavailableToken.into());
    }

    let store = state.database();
    let unknown = |e: StoreError<sqlx::Error>| {
        tracing::warn!(account = %account, error = %e, "registration store failure");
        ErrorCode::UnknownError
    };
    if store.is_registered(&account).await.map_err(unknown)? {
        return Err(ErrorCode::AlreadyRegistered.into());
    }

    let program_root = state.sandbox().program_root(&account, DEFAULT_PROGRAM);
    tokio::fs::create_dir_all(&program_root).await?;

    if !store.register(&account).await.map_err(unknown)? {
        return Err(ErrorCode::AlreadyRegistered.into());
    }
    tracing::info!(account = %account, "account registered");

    Ok(Json(serde_json::json!({})))
}
