//! GitHub OAuth provider.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use url::Url;

use super::provider::{
    IdentityProvider, ProviderConfig, ProviderError, ProviderProfile, TokenResponse,
};
use crate::auth::Provider;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

/// GitHub rejects API calls without a User-Agent
const CLIENT_USER_AGENT: &str = concat!("warden/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GithubProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl GithubProvider {
    pub fn new(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, ProviderError> {
        Ok(self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn kind(&self) -> Provider {
        Provider::Github
    }

    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError> {
        Ok(Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", "read:user user:email"),
                ("state", state),
            ],
        )?)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;
        response.into_access_token()
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let user: GithubUser = self.get_json(USER_URL, access_token).await?;
        // The profile email may be private; the emails endpoint says which are verified
        let emails: Vec<GithubEmail> = match self.get_json(EMAILS_URL, access_token).await {
            Ok(emails) => emails,
            Err(e) => {
                log::warn!("Could not list GitHub emails for user {}: {}", user.id, e);
                Vec::new()
            }
        };
        Ok(profile_from(user, &emails))
    }
}

fn profile_from(user: GithubUser, emails: &[GithubEmail]) -> ProviderProfile {
    let email = emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone());
    let name = user
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(user.login);

    ProviderProfile {
        provider_id: user.id.to_string(),
        email,
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_scopes() {
        let provider = GithubProvider::new(
            reqwest::Client::new(),
            ProviderConfig {
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
                redirect_url: "https://app.test/auth/github/callback".to_string(),
            },
        );
        let url = provider.authorization_url("abc").unwrap();
        assert!(url.as_str().starts_with(AUTHORIZE_URL));
        let scope = url
            .query_pairs()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.into_owned());
        assert_eq!(scope.as_deref(), Some("read:user user:email"));
    }

    #[test]
    fn test_profile_prefers_primary_verified_email() {
        let user: GithubUser =
            serde_json::from_str(r#"{"id":42,"login":"octo","name":null}"#).unwrap();
        let emails: Vec<GithubEmail> = serde_json::from_str(
            r#"[
                {"email":"old@example.com","primary":false,"verified":true},
                {"email":"main@example.com","primary":true,"verified":true},
                {"email":"spam@example.com","primary":false,"verified":false}
            ]"#,
        )
        .unwrap();
        let profile = profile_from(user, &emails);
        assert_eq!(profile.provider_id, "42");
        assert_eq!(profile.email.as_deref(), Some("main@example.com"));
        assert_eq!(profile.name, "octo");
    }

    #[test]
    fn test_profile_without_verified_email() {
        let user: GithubUser =
            serde_json::from_str(r#"{"id":7,"login":"octo","name":"Octo Cat"}"#).unwrap();
        let emails: Vec<GithubEmail> =
            serde_json::from_str(r#"[{"email":"x@example.com","primary":true,"verified":false}]"#)
                .unwrap();
        let profile = profile_from(user, &emails);
        assert!(profile.email.is_none());
        assert_eq!(profile.name, "Octo Cat");
    }
}
