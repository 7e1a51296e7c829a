use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/login", post(handlers::login))
        .route("/api/summary", get(handlers::summary))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
