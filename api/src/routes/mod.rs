use axum::Router;

use crate::shared_state::AppState;

mod auth;
mod cache;
mod health;
mod image;

pub fn configure_routes() -> Router<AppState> {
    let api = Router::new()
        .merge(health::configure())
        .nest("/auth", auth::configure())
        .nest("/images", image::configure())
        .nest("/cache", cache::configure());

    Router::new().nest("/api", api)
}
