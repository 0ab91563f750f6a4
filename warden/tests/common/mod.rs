//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;
use warden::auth::{LoginRequest, Provider, RegisterRequest, SessionMetadata};
use warden::db::InMemoryStore;
use warden::identity::{
    IdentityProvider, ProviderError, ProviderProfile, ProviderRegistry,
};
use warden::mail::{MemoryMailQueue, extract_token};
use warden::risk::{GeoError, GeoLocation, GeoLocator};
use warden::{Stores, Warden, WardenConfig};

pub const ACCESS_SECRET: &str = "test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &str = "test-refresh-secret-0123456789abcdef";
pub const PEPPER: &str = "test-pepper-0123456789";
pub const FRONTEND: &str = "https://app.test";

/// Locator answering from a fixed IP to country table
pub struct StaticLocator {
    countries: HashMap<String, String>,
}

impl StaticLocator {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            countries: entries
                .iter()
                .map(|(ip, cc)| (ip.to_string(), cc.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl GeoLocator for StaticLocator {
    async fn locate(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        let country_code = self
            .countries
            .get(ip)
            .cloned()
            .ok_or_else(|| GeoError::Lookup(format!("no entry for {ip}")))?;
        Ok(GeoLocation {
            country_code,
            city: None,
            region: None,
            latitude: None,
            longitude: None,
        })
    }
}

/// Provider that accepts a single code and returns a canned profile
pub struct FakeProvider {
    pub kind: Provider,
    pub code: String,
    pub profile: ProviderProfile,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn kind(&self) -> Provider {
        self.kind
    }

    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError> {
        Ok(Url::parse_with_params(
            "https://provider.test/authorize",
            &[("state", state)],
        )?)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        if code == self.code {
            Ok("provider-access-token".to_string())
        } else {
            Err(ProviderError::Rejected("bad_verification_code".to_string()))
        }
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, ProviderError> {
        Ok(self.profile.clone())
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub mail: Arc<MemoryMailQueue>,
    pub warden: Warden,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(StaticLocator::new(&[]), ProviderRegistry::new())
    }

    pub fn with_locations(entries: &[(&str, &str)]) -> Self {
        Self::with(StaticLocator::new(entries), ProviderRegistry::new())
    }

    pub fn with(locator: StaticLocator, providers: ProviderRegistry) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let mail = Arc::new(MemoryMailQueue::new());
        let mut config = WardenConfig::new(
            ACCESS_SECRET.to_string(),
            REFRESH_SECRET.to_string(),
            PEPPER.to_string(),
        );
        config.frontend_url = FRONTEND.to_string();

        let warden = Warden::new(
            &config,
            Stores::memory(store.clone()),
            Arc::new(locator),
            mail.clone(),
            providers,
        );
        Self { store, mail, warden }
    }

    pub async fn register(&self, username: &str, password: &str, email: Option<&str>) -> i64 {
        let (user, _) = self
            .warden
            .auth
            .register(RegisterRequest {
                username: username.to_string(),
                password: password.to_string(),
                email: email.map(str::to_string),
            })
            .await
            .expect("registration should succeed");
        user.id
    }

    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        metadata: &SessionMetadata,
    ) -> warden::auth::IssuedCredentials {
        let (_, credentials) = self
            .warden
            .auth
            .login(
                LoginRequest {
                    identifier: identifier.to_string(),
                    password: password.to_string(),
                },
                metadata,
            )
            .await
            .expect("login should succeed");
        credentials
    }

    /// Token from the most recent mail to `to`
    pub fn last_token_to(&self, to: &str) -> String {
        let messages = self.mail.messages_to(to);
        let message = messages.last().expect("a mail should have been sent");
        extract_token(&message.html).expect("mail should contain a token link")
    }
}

pub fn device(user_agent: &str, ip: &str) -> SessionMetadata {
    SessionMetadata::new(user_agent, ip)
}
