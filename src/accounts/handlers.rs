use axum::{
    extract::{FromRequest, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    accounts::{
        dto::{
            ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
            ResetPasswordRequest, UserResponse,
        },
        errors::AccountError,
    },
    state::AppState,
};

/// `Json` whose rejections answer with the usual `{ "message" }` body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AccountError))]
pub struct AppJson<T>(pub T);

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/:token", patch(reset_password))
        .route("/users", get(list_users))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AccountError> {
    let user = state
        .accounts
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state
        .accounts
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(MessageResponse::new("Logged in successfully")))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.request_password_reset(&payload.email).await?;
    Ok(Json(MessageResponse::new(
        "Email sent with reset password instructions",
    )))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state
        .accounts
        .reset_password(&token, &payload.password)
        .await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AccountError> {
    let users = state.accounts.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
