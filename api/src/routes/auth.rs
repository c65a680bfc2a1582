use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{event, Level};
use visuasort_auth::Identity;

use crate::{shared_state::AppState, Result};

#[derive(Deserialize)]
struct LoginInput {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse> {
    let authenticator = state.authenticator.clone();
    let username = body.username.clone();
    // Password hashing is slow on purpose, so keep it off the async workers.
    let issued =
        tokio::task::spawn_blocking(move || authenticator.login(&body.username, &body.password))
            .await?;

    match issued {
        Ok(issued) => {
            event!(Level::INFO, %username, role = ?issued.user.role, "user logged in");
            Ok(Json(issued))
        }
        Err(e) => {
            event!(Level::INFO, %username, error = %e, "login failed");
            Err(e.into())
        }
    }
}

async fn me(identity: Identity) -> impl IntoResponse {
    Json(identity)
}

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
}
