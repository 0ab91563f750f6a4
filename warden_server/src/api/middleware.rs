//! Session validation middleware for protected endpoints.
//!
//! Credentials are read from the `accessToken` and `sessionId` cookies. Non
//! browser clients may instead send `Authorization: Bearer <token>` together
//! with an `x-session-id` header. On success an
//! [`AuthContext`](warden::AuthContext) is injected into request extensions:
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use warden::AuthContext;
//!
//! async fn protected_handler(Extension(ctx): Extension<AuthContext>) -> String {
//!     format!("Authenticated as user {}", ctx.user_id())
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use super::AppState;
use super::client::ClientMeta;
use super::cookies::{self, ACCESS_COOKIE, SESSION_COOKIE};
use super::error::ApiError;
use crate::logging::log_security_event;

pub const SESSION_ID_HEADER: &str = "x-session-id";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Reject the request unless it carries a valid access credential bound to a live session
pub async fn auth_middleware(
    State(state): State<AppState>,
    cookies: Cookies,
    client: ClientMeta,
    mut request: Request,
    next: Next,
) -> Response {
    let access_token =
        cookies::value(&cookies, ACCESS_COOKIE).or_else(|| bearer_token(request.headers()));
    let session_id =
        cookies::value(&cookies, SESSION_COOKIE).or_else(|| session_header(request.headers()));

    match state
        .warden
        .validator
        .validate(access_token.as_deref(), session_id.as_deref())
        .await
    {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => {
            if access_token.is_some() {
                log_security_event(
                    "session_rejected",
                    None,
                    Some(&client.ip_address),
                    &e.to_string(),
                );
            }
            ApiError(e).into_response()
        }
    }
}
