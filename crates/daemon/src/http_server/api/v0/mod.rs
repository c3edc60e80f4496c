use axum::routing::{delete, get, post};
use axum::Router;

pub mod auth;
mod error;
pub mod indir;
pub mod paths;
pub mod public;
pub mod register;
pub mod upload;

pub use error::{ApiError, ErrorBody};

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/upload", get(upload::handler))
        .route("/register", get(register::status).post(register::handler))
        .route("/readdir", get(indir::readdir::handler))
        .route(
            "/program",
            post(indir::program::create).delete(indir::program::remove),
        )
        .route("/mkdir", post(indir::mkdir::handler))
        .route("/download", get(indir::download::handler))
        .route("/file", get(indir::file::handler))
        .route("/mimetype", get(indir::mimetype::handler))
        .route("/stat", get(indir::stat::handler))
        .route("/indir", delete(indir::remove::handler))
        .route("/mv", post(indir::mv::handler))
        .route("/cp", post(indir::cp::handler))
        .nest("/public", public::router(state.clone()))
        .with_state(state)
}
