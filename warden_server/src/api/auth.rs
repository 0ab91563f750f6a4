//! Authentication API handlers.
//!
//! Register, login, logout and refresh, plus session self-management for
//! signed-in users. Credentials travel in HTTP-only cookies; response
//! bodies carry only the account view and session id.
//!
//! Login:
//! ```bash
//! curl -c jar -X POST http://localhost:8080/api/v1/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"identifier": "ann", "password": "Pass123!"}'
//! ```

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use warden::AuthContext;
use warden::auth::{AccountStatus, LoginRequest, RegisterRequest, Role, SessionSummary, User, UserId};

use super::AppState;
use super::client::ClientMeta;
use super::cookies::{self, REFRESH_COOKIE, SESSION_COOKIE};
use super::error::ApiResult;
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    /// Username or email address
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

/// Account view returned to clients
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub pending_email: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub google_linked: bool,
    pub github_linked: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            pending_email: user.pending_email.clone(),
            role: user.role,
            status: user.status,
            google_linked: user.google_id.is_some(),
            github_linked: user.github_id.is_some(),
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

/// Register a password account.
///
/// Sets access and refresh cookies; no session exists until the first login.
/// When an email is given a verification mail is sent.
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RegisterPayload>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let request = RegisterRequest {
        username: payload.username,
        password: payload.password,
        email: payload.email,
    };

    let (user, credentials) = state.warden.auth.register(request).await?;

    if user.email.is_some()
        && let Err(e) = state.warden.verification.send_verification(user.id).await
    {
        tracing::warn!(user_id = user.id, error = %e, "Verification mail not sent");
    }

    cookies::set_credentials(&cookies, &credentials, state.cookie_secure);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserResponse::from(&user),
            session_id: credentials.session_id,
        }),
    ))
}

/// Log in with a username or email and a password
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    client: ClientMeta,
    Json(payload): Json<LoginPayload>,
) -> ApiResult<Json<AuthResponse>> {
    let request = LoginRequest {
        identifier: payload.identifier,
        password: payload.password,
    };

    let (user, credentials) = match state.warden.auth.login(request, &client.metadata()).await {
        Ok(result) => result,
        Err(e) => {
            log_security_event("failed_login", None, Some(&client.ip_address), &e.to_string());
            return Err(e.into());
        }
    };

    cookies::set_credentials(&cookies, &credentials, state.cookie_secure);
    Ok(Json(AuthResponse {
        user: UserResponse::from(&user),
        session_id: credentials.session_id,
    }))
}

/// Invalidate the current session and clear all credential cookies
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> ApiResult<StatusCode> {
    let session_id = cookies::value(&cookies, SESSION_COOKIE);
    let result = state.warden.auth.logout(session_id.as_deref()).await;

    cookies::clear_credentials(&cookies, state.cookie_secure);
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotate the refresh credential of the current session
pub async fn refresh(
    State(state): State<AppState>,
    cookies: Cookies,
    client: ClientMeta,
) -> ApiResult<Json<RefreshResponse>> {
    let session_id = cookies::value(&cookies, SESSION_COOKIE);
    let refresh_token = cookies::value(&cookies, REFRESH_COOKIE);

    let credentials = match state
        .warden
        .auth
        .refresh(session_id.as_deref(), refresh_token.as_deref())
        .await
    {
        Ok(credentials) => credentials,
        Err(e) => {
            log_security_event(
                "refresh_rejected",
                None,
                Some(&client.ip_address),
                &e.to_string(),
            );
            return Err(e.into());
        }
    };

    cookies::set_credentials(&cookies, &credentials, state.cookie_secure);
    Ok(Json(RefreshResponse {
        session_id: credentials.session_id,
    }))
}

/// Account behind the current session
pub async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.warden.auth.current_user(ctx.user_id()).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Account by id; callers see their own, admins see any
pub async fn get_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.warden.auth.account(&ctx, user_id).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// Live sessions of the current user
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    Ok(Json(state.warden.auth.list_sessions(ctx.user_id()).await?))
}

/// Revoke one of the caller's sessions
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.warden.auth.revoke_session(&ctx, &session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Invalidate every session of the caller, this one included
pub async fn logout_all(
    State(state): State<AppState>,
    cookies: Cookies,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<LogoutAllResponse>> {
    let revoked = state.warden.auth.logout_all(ctx.user_id()).await?;
    cookies::clear_credentials(&cookies, state.cookie_secure);

    log_security_event(
        "logout_all",
        Some(ctx.user_id()),
        None,
        &format!("Revoked {revoked} session(s)"),
    );
    Ok(Json(LogoutAllResponse { revoked }))
}
