use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{CredentialsRequest, PublicUser, RefreshRequest, Tokens},
        extractors::AuthUser,
    },
    error::{AppError, AppResult},
    extract::JsonBody,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/sign-up", post(sign_up))
        .route("/users/sign-in", post(sign_in))
        .route("/users/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let user = state.auth.sign_up(&payload.login, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<Json<Tokens>> {
    let tokens = state.auth.sign_in(&payload.login, &payload.password).await?;
    Ok(Json(tokens))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RefreshRequest>,
) -> AppResult<Json<Tokens>> {
    let tokens = state
        .auth
        .refresh_tokens(&payload.refresh_token)
        .await
        .map_err(|e| match e {
            AppError::UserNotFound => AppError::InvalidToken,
            other => other,
        })?;
    Ok(Json(tokens))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = state.auth.get_user(user_id).await.map_err(|e| match e {
        AppError::UserNotFound => AppError::InvalidToken,
        other => other,
    })?;
    Ok(Json(user))
}
