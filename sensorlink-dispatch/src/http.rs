use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::{DispatchState, DispatchStats};

/// Routes for `/health` and `/stats`.
pub fn router(state: DispatchState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn stats_handler(State(state): State<DispatchState>) -> Json<DispatchStats> {
    Json(state.snapshot().await)
}
