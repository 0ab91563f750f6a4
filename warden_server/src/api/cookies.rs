//! Credential and OAuth state cookies.

use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::{Duration, OffsetDateTime};
use tower_cookies::{Cookie, Cookies};
use warden::auth::IssuedCredentials;
use warden::auth::jwt::{ACCESS_TOKEN_TTL_MINUTES, REFRESH_TOKEN_TTL_DAYS};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const SESSION_COOKIE: &str = "sessionId";
pub const OAUTH_STATE_COOKIE: &str = "oauthState";

/// How long a provider round trip may take
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

fn credential_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(max_age)
        .build()
}

fn expired_cookie(name: &'static str, same_site: SameSite, secure: bool) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .same_site(same_site)
        .secure(secure)
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Set access and refresh cookies, plus `sessionId` when a session was created
pub fn set_credentials(cookies: &Cookies, credentials: &IssuedCredentials, secure: bool) {
    cookies.add(credential_cookie(
        ACCESS_COOKIE,
        credentials.access_token.clone(),
        Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
        secure,
    ));
    cookies.add(credential_cookie(
        REFRESH_COOKIE,
        credentials.refresh_token.clone(),
        Duration::days(REFRESH_TOKEN_TTL_DAYS),
        secure,
    ));
    if let Some(session_id) = &credentials.session_id {
        cookies.add(credential_cookie(
            SESSION_COOKIE,
            session_id.clone(),
            Duration::days(REFRESH_TOKEN_TTL_DAYS),
            secure,
        ));
    }
}

/// Overwrite all credential cookies with empty, already expired values
pub fn clear_credentials(cookies: &Cookies, secure: bool) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE, SESSION_COOKIE] {
        cookies.add(expired_cookie(name, SameSite::Strict, secure));
    }
}

pub fn value(cookies: &Cookies, name: &str) -> Option<String> {
    cookies
        .get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Remember the state handed to a provider.
///
/// The callback arrives as a cross-site navigation, so this cookie is `Lax`.
pub fn set_oauth_state(cookies: &Cookies, state: &str, secure: bool) {
    cookies.add(
        Cookie::build((OAUTH_STATE_COOKIE, state.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(secure)
            .max_age(Duration::minutes(OAUTH_STATE_TTL_MINUTES))
            .build(),
    );
}

/// Read and clear the stored OAuth state
pub fn take_oauth_state(cookies: &Cookies, secure: bool) -> Option<String> {
    let state = value(cookies, OAUTH_STATE_COOKIE);
    if state.is_some() {
        cookies.add(expired_cookie(OAUTH_STATE_COOKIE, SameSite::Lax, secure));
    }
    state
}
