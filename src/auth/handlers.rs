use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        cookie::{cleared_session_cookie, session_cookie},
        dto::{LoginRequest, MessageResponse, RegisterRequest},
        services,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let token = services::login(&state, payload).await?;
    let cookie = session_cookie(
        &token,
        i64::try_from(state.jwt.ttl.as_secs()).unwrap_or(i64::MAX),
        state.secure_cookies(),
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse::new("Logged in successfully")),
    ))
}

/// Overwrite the session cookie. Tokens copied before this call stay valid until they expire.
#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, cleared_session_cookie(state.secure_cookies()))],
        Json(MessageResponse::new("Logged out successfully")),
    )
}
