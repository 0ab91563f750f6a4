//! Email verification, email change and password reset handlers.

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use warden::AuthContext;

use super::AppState;
use super::auth::UserResponse;
use super::client::ClientMeta;
use super::error::ApiResult;
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordPayload {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub message: String,
    pub user: UserResponse,
}

/// `GET /auth/verify-email?token=`
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<VerifiedResponse>> {
    let user = state.warden.verification.verify(&query.token).await?;
    Ok(Json(VerifiedResponse {
        message: "Email verified".to_string(),
        user: UserResponse::from(&user),
    }))
}

/// Send a fresh verification mail to the caller's address
pub async fn send_verification(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .warden
        .verification
        .send_verification(ctx.user_id())
        .await?;
    Ok(MessageResponse::new("Verification email sent"))
}

/// Start an email change; the new address takes effect once verified
pub async fn change_email(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<EmailPayload>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .warden
        .verification
        .request_email_change(ctx.user_id(), &payload.email)
        .await?;
    Ok(MessageResponse::new("Verification email sent to the new address"))
}

/// Always answers with the same message, whether or not the account exists
pub async fn request_password_reset(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(payload): Json<EmailPayload>,
) -> ApiResult<Json<MessageResponse>> {
    let message = state.warden.reset.request(&payload.email).await?;
    log_security_event(
        "password_reset_requested",
        None,
        Some(&client.ip_address),
        "Password reset requested",
    );
    Ok(MessageResponse::new(message))
}

/// Set a new password with a reset token; every session of the account ends
pub async fn reset_password(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(payload): Json<ResetPasswordPayload>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .warden
        .reset
        .reset(&payload.token, &payload.password)
        .await?;
    log_security_event(
        "password_reset",
        None,
        Some(&client.ip_address),
        "Password reset completed",
    );
    Ok(MessageResponse::new("Password has been reset"))
}
