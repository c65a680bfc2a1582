use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use visuasort_auth::Identity;
use visuasort_db::ReadThroughCache;

use crate::{shared_state::AppState, Error, Result};

fn admin_cache<'a>(state: &'a AppState, identity: &Identity) -> Result<Option<&'a ReadThroughCache>> {
    if !identity.is_admin() {
        return Err(Error::AdminRequired);
    }

    Ok(state.repository.cache())
}

async fn stats(State(state): State<AppState>, identity: Identity) -> Result<impl IntoResponse> {
    let body = match admin_cache(&state, &identity)? {
        Some(cache) => json!({ "enabled": true, "stats": cache.stats().await }),
        None => json!({ "enabled": false }),
    };
    Ok(Json(body))
}

async fn clear(State(state): State<AppState>, identity: Identity) -> Result<impl IntoResponse> {
    let removed = match admin_cache(&state, &identity)? {
        Some(cache) => cache.clear().await?,
        None => 0,
    };
    Ok(Json(json!({ "message": "Cache cleared", "removed": removed })))
}

/// Drop expired entries. Backends that expire entries themselves report 0.
async fn cleanup(State(state): State<AppState>, identity: Identity) -> Result<impl IntoResponse> {
    let removed = match admin_cache(&state, &identity)? {
        Some(cache) => cache.cleanup().await?,
        None => 0,
    };
    Ok(Json(json!({ "message": "Cache cleanup complete", "removed": removed })))
}

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/clear", post(clear))
        .route("/cleanup", post(cleanup))
}
