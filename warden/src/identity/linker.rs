//! Resolution of provider logins into local accounts.

use std::sync::Arc;

use chrono::Utc;

use super::provider::{ProviderProfile, ProviderRegistry};
use crate::auth::email::{claim_email, normalize_email, same_address};
use crate::auth::generate::{
    GENERATED_PASSWORD_LENGTH, USERNAME_COUNTER_ATTEMPTS, sanitize_username, strong_password,
    username_candidate,
};
use crate::auth::{
    AuthError, AuthResult, CredentialIssuer, IssuedCredentials, NewUser, PasswordHasher,
    Provider, Role, SessionMetadata, User,
};
use crate::db::UserRepository;

/// Random-suffix attempts after the counter suffixes are exhausted
const RANDOM_SUFFIX_ATTEMPTS: u32 = 20;

/// Links provider identities to accounts
#[derive(Clone)]
pub struct IdentityLinker {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
}

impl IdentityLinker {
    pub fn new(users: Arc<dyn UserRepository>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    /// Find or create the account for a provider identity.
    ///
    /// In order: an account already linked to `provider_id`, an account
    /// holding `email` (which gets the provider linked), or a new account.
    pub async fn upsert(
        &self,
        provider: Provider,
        provider_id: &str,
        email: Option<&str>,
        name: &str,
    ) -> AuthResult<User> {
        let email = email
            .map(normalize_email)
            .filter(|email| !email.is_empty());
        let now = Utc::now();

        if let Some(mut user) = self.users.find_by_provider_id(provider, provider_id).await? {
            if let Some(email) = &email {
                let differs = !user
                    .email
                    .as_deref()
                    .is_some_and(|current| same_address(current, email));
                if differs || !user.email_verified {
                    match claim_email(self.users.as_ref(), &mut user, email, now).await {
                        Ok(()) => self.users.save_user(&user).await?,
                        Err(AuthError::BadRequest(reason)) => {
                            log::warn!(
                                "Not syncing {} email onto user {}: {}",
                                provider,
                                user.id,
                                reason
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            return Ok(user);
        }

        if let Some(email) = &email
            && let Some(mut user) = self.users.find_by_email(email).await?
        {
            if user.provider_id(provider).is_some() {
                return Err(AuthError::bad_request(format!(
                    "Email is linked to a different {provider} account"
                )));
            }
            user.set_provider_id(provider, provider_id.to_string());
            claim_email(self.users.as_ref(), &mut user, email, now).await?;
            self.users.save_user(&user).await?;
            log::info!("Linked {} account to existing user {}", provider, user.id);
            return Ok(user);
        }

        self.create(provider, provider_id, email, name).await
    }

    async fn create(
        &self,
        provider: Provider,
        provider_id: &str,
        email: Option<String>,
        name: &str,
    ) -> AuthResult<User> {
        let base = sanitize_username(name);
        let password = strong_password(&mut rand::rng(), GENERATED_PASSWORD_LENGTH);
        let password_hash = self.hasher.hash(&password)?;

        for attempt in 0..=USERNAME_COUNTER_ATTEMPTS + RANDOM_SUFFIX_ATTEMPTS {
            let username = username_candidate(&base, attempt, &mut rand::rng());
            if self.users.find_by_username(&username).await?.is_some() {
                continue;
            }

            let new_user = NewUser {
                username,
                password_hash: Some(password_hash.clone()),
                email: email.clone(),
                email_verified: email.is_some(),
                provider: Some((provider, provider_id.to_string())),
                role: Role::User,
            };
            match self.users.create_user(new_user).await {
                Ok(user) => {
                    log::info!(
                        "Created user {} ({}) from {} login",
                        user.id,
                        user.username,
                        provider
                    );
                    return Ok(user);
                }
                // Lost a race for the username; try the next candidate
                Err(AuthError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(AuthError::Conflict(format!(
            "Could not allocate a username for '{base}'"
        )))
    }
}

/// Full provider login: code exchange, profile, account resolution, issuance
#[derive(Clone)]
pub struct IdentityService {
    providers: ProviderRegistry,
    linker: IdentityLinker,
    issuer: CredentialIssuer,
}

impl IdentityService {
    pub fn new(providers: ProviderRegistry, linker: IdentityLinker, issuer: CredentialIssuer) -> Self {
        Self {
            providers,
            linker,
            issuer,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Authorization redirect for `provider`
    pub fn authorization_url(&self, provider: Provider, state: &str) -> AuthResult<String> {
        let handler = self.providers.get(provider).ok_or_else(|| not_configured(provider))?;
        Ok(handler.authorization_url(state)?.to_string())
    }

    /// Complete a login from a provider callback
    pub async fn complete_login(
        &self,
        provider: Provider,
        code: &str,
        metadata: &SessionMetadata,
    ) -> AuthResult<(User, IssuedCredentials)> {
        if code.is_empty() {
            return Err(AuthError::bad_request("Missing authorization code"));
        }
        let handler = self.providers.get(provider).ok_or_else(|| not_configured(provider))?;

        let access_token = handler.exchange_code(code).await?;
        let profile = handler.fetch_profile(&access_token).await?;
        self.login_with_profile(provider, &profile, metadata).await
    }

    /// Resolve an already fetched profile and issue credentials
    pub async fn login_with_profile(
        &self,
        provider: Provider,
        profile: &ProviderProfile,
        metadata: &SessionMetadata,
    ) -> AuthResult<(User, IssuedCredentials)> {
        let user = self
            .linker
            .upsert(
                provider,
                &profile.provider_id,
                profile.email.as_deref(),
                &profile.name,
            )
            .await?;

        if let Some(message) = user.inactive_message(Utc::now()) {
            return Err(AuthError::Unauthorized(message));
        }

        let credentials = self.issuer.issue(user.id, Some(metadata)).await?;
        Ok((user, credentials))
    }
}

fn not_configured(provider: Provider) -> AuthError {
    AuthError::bad_request(format!("Provider {provider} is not configured"))
}
