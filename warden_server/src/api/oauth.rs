//! Identity provider redirect and callback handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;
use warden::AuthError;
use warden::auth::Provider;

use super::AppState;
use super::client::ClientMeta;
use super::cookies;
use super::error::ApiResult;
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: String,
    pub state: Option<String>,
    /// Set by the provider when the user declined or the request was invalid
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<Provider>,
}

/// Providers with complete configuration
pub async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.warden.identity.providers().kinds(),
    })
}

/// `GET /auth/{provider}`: remember a fresh state and redirect to the provider
pub async fn authorize(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(provider): Path<String>,
) -> ApiResult<Redirect> {
    let provider: Provider = provider.parse()?;
    let oauth_state = Uuid::new_v4().simple().to_string();

    let url = state
        .warden
        .identity
        .authorization_url(provider, &oauth_state)?;
    cookies::set_oauth_state(&cookies, &oauth_state, state.cookie_secure);

    Ok(Redirect::to(&url))
}

/// `GET /auth/{provider}/callback`: check state, link the identity, start a session
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    client: ClientMeta,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Redirect> {
    let provider: Provider = provider.parse()?;
    let expected = cookies::take_oauth_state(&cookies, state.cookie_secure);

    let state_ok = match (expected.as_deref(), query.state.as_deref()) {
        (Some(expected), Some(received)) => expected == received,
        _ => false,
    };
    if !state_ok {
        log_security_event(
            "oauth_state_mismatch",
            None,
            Some(&client.ip_address),
            &format!("Rejected {provider} callback"),
        );
        return Err(AuthError::bad_request("Invalid OAuth state").into());
    }

    if let Some(error) = query.error {
        tracing::info!(%provider, %error, "Provider returned an error");
        return Err(AuthError::bad_request(format!("Login with {provider} was not completed")).into());
    }

    let (user, credentials) = state
        .warden
        .identity
        .complete_login(provider, &query.code, &client.metadata())
        .await?;

    tracing::info!(user_id = user.id, %provider, "Provider login");
    cookies::set_credentials(&cookies, &credentials, state.cookie_secure);
    Ok(Redirect::to(&state.frontend_url))
}
