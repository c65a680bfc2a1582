use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::shared_state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    /// If the metadata store answered
    database: bool,
    /// Image jobs running right now
    busy_workers: usize,
    workers: usize,
    /// If all the other fields indicate healthy status.
    healthy: bool,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.repository.ping().await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            database,
            busy_workers: state.workers.busy(),
            workers: state.workers.size(),
            healthy: database,
        }),
    )
}

pub fn configure() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
