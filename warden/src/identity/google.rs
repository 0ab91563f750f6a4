//! Google OAuth 2.0 provider.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::provider::{
    IdentityProvider, ProviderConfig, ProviderError, ProviderProfile, TokenResponse,
};
use crate::auth::Provider;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
}

pub struct GoogleProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl GoogleProvider {
    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> Provider {
        Provider::Google
    }

    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError> {
        Ok(Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )?)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .json()
            .await?;
        response.into_access_token()
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let user: GoogleUser = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(profile_from(user))
    }
}

fn profile_from(user: GoogleUser) -> ProviderProfile {
    let email = user.email.filter(|_| user.verified_email);
    let name = user
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| {
            email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .map(str::to_string)
        })
        .unwrap_or_default();

    ProviderProfile {
        provider_id: user.id,
        email,
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GoogleProvider {
        GoogleProvider::new(
            reqwest::Client::new(),
            ProviderConfig {
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
                redirect_url: "https://app.test/auth/google/callback".to_string(),
            },
        )
    }

    #[test]
    fn test_authorization_url() {
        let url = provider().authorization_url("st4te").unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".to_string(), "st4te".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "https://app.test/auth/google/callback".to_string()
        )));
        assert!(!url.as_str().contains("secret"));
    }

    #[test]
    fn test_unverified_email_is_dropped() {
        let user: GoogleUser = serde_json::from_str(
            r#"{"id":"123","email":"ann@example.com","verified_email":false,"name":"Ann"}"#,
        )
        .unwrap();
        let profile = profile_from(user);
        assert_eq!(profile.provider_id, "123");
        assert!(profile.email.is_none());
        assert_eq!(profile.name, "Ann");
    }

    #[test]
    fn test_name_falls_back_to_email_local_part() {
        let user: GoogleUser =
            serde_json::from_str(r#"{"id":"9","email":"ann.smith@example.com","verified_email":true}"#)
                .unwrap();
        assert_eq!(profile_from(user).name, "ann.smith");
    }
}
