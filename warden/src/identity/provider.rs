//! Identity provider capability and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::auth::{AuthError, Provider};

/// OAuth client registration for one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Profile returned by a provider after a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    /// Only set when the provider vouches for the address
    pub email: Option<String>,
    pub name: String,
}

/// Identity provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid provider URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    #[error("Provider response missing {0}")]
    MissingField(&'static str),
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        AuthError::Upstream(err.to_string())
    }
}

/// OAuth authorization-code flow against one provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> Provider;

    /// Where to send the browser to start a login
    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError>;

    /// Trade an authorization code for a provider access token
    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError>;

    /// Fetch the profile behind a provider access token
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError>;
}

/// Configured providers by kind
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn get(&self, kind: Provider) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Configured kinds in a stable order
    pub fn kinds(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }
}

/// Token endpoint response shared by both providers
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_access_token(self) -> Result<String, ProviderError> {
        match self.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(match (self.error, self.error_description) {
                (_, Some(description)) => ProviderError::Rejected(description),
                (Some(error), None) => ProviderError::Rejected(error),
                (None, None) => ProviderError::MissingField("access_token"),
            }),
        }
    }
}
