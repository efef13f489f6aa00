use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, SignupRequest, UpdateMeRequest, UpdatePasswordRequest,
            UserResponse, UsersResponse,
        },
        extractors::CurrentUser,
        repo_types::Role,
    },
    error::AppResult,
    response::{Envelope, JsonBody},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/updatePassword", patch(update_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/getMe", get(get_me))
        .route("/users/updateMe", patch(update_me))
        .route("/users/deleteMe", delete(delete_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/users", get(list_users))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> AppResult<Envelope<AuthResponse>> {
    let res = state.auth.signup(payload).await?;
    Ok(Envelope::success(StatusCode::CREATED, res, 1))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Envelope<AuthResponse>> {
    let res = state.auth.login(payload.email, payload.password).await?;
    Ok(Envelope::success(StatusCode::OK, res, 1))
}

#[instrument(skip(state, user, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<UpdatePasswordRequest>,
) -> AppResult<Envelope<AuthResponse>> {
    let res = state.auth.update_password(user.id, payload).await?;
    Ok(Envelope::success(StatusCode::OK, res, 1))
}

#[instrument(skip(state, user))]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Envelope<UserResponse> {
    let user = state.auth.me(user);
    Envelope::success(StatusCode::OK, UserResponse { user }, 1)
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(payload): JsonBody<UpdateMeRequest>,
) -> AppResult<Envelope<UserResponse>> {
    let user = state.auth.update_me(user.id, payload).await?;
    Ok(Envelope::success(StatusCode::OK, UserResponse { user }, 1))
}

#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<impl IntoResponse> {
    state.auth.delete_me(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Envelope<UsersResponse>> {
    state.auth.restrict_to(&[Role::Admin], &user)?;
    let users = state.auth.list_users().await?;
    let count = users.len();
    Ok(Envelope::success(StatusCode::OK, UsersResponse { users }, count))
}
