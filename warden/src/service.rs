//! Wiring of every component over one set of stores.

use std::sync::Arc;

use chrono::Duration;
use sqlx::PgPool;

use crate::auth::{AuthManager, CredentialIssuer, PasswordHasher, SessionValidator, TokenSigner};
use crate::db::{
    InMemoryStore, PgSessionRepository, PgTokenRepository, PgUserRepository, SessionRepository,
    TokenRepository, UserRepository,
};
use crate::identity::{IdentityLinker, IdentityService, ProviderRegistry};
use crate::mail::MailQueue;
use crate::risk::GeoLocator;
use crate::tokens::{EmailVerificationManager, PasswordResetManager};

/// Secrets and policy shared by all components
#[derive(Clone)]
pub struct WardenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub pepper: String,
    /// Frontend origin used in emailed links
    pub frontend_url: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Revoke a session when a stale refresh credential is presented for it
    pub revoke_on_refresh_mismatch: bool,
}

impl WardenConfig {
    pub fn new(access_secret: String, refresh_secret: String, pepper: String) -> Self {
        Self {
            access_secret,
            refresh_secret,
            pepper,
            frontend_url: "http://localhost:3000".to_string(),
            access_ttl: Duration::minutes(crate::auth::jwt::ACCESS_TOKEN_TTL_MINUTES),
            refresh_ttl: Duration::days(crate::auth::jwt::REFRESH_TOKEN_TTL_DAYS),
            revoke_on_refresh_mismatch: true,
        }
    }
}

/// Repository handles
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub tokens: Arc<dyn TokenRepository>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            tokens: Arc::new(PgTokenRepository::new(pool)),
        }
    }

    pub fn memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            tokens: store,
        }
    }
}

/// All components, ready to serve
#[derive(Clone)]
pub struct Warden {
    pub auth: AuthManager,
    pub validator: SessionValidator,
    pub issuer: CredentialIssuer,
    pub identity: IdentityService,
    pub verification: EmailVerificationManager,
    pub reset: PasswordResetManager,
}

impl Warden {
    pub fn new(
        config: &WardenConfig,
        stores: Stores,
        geo: Arc<dyn GeoLocator>,
        mail: Arc<dyn MailQueue>,
        providers: ProviderRegistry,
    ) -> Self {
        let signer = TokenSigner::new(config.access_secret.clone(), config.refresh_secret.clone())
            .with_ttls(config.access_ttl, config.refresh_ttl);
        let hasher = PasswordHasher::new(config.pepper.clone());

        let issuer = CredentialIssuer::new(
            stores.users.clone(),
            stores.sessions.clone(),
            signer.clone(),
            geo,
            mail.clone(),
        )
        .revoke_on_refresh_mismatch(config.revoke_on_refresh_mismatch);

        let validator =
            SessionValidator::new(stores.users.clone(), stores.sessions.clone(), signer);
        let auth = AuthManager::new(
            stores.users.clone(),
            stores.sessions.clone(),
            hasher.clone(),
            issuer.clone(),
        );
        let identity = IdentityService::new(
            providers,
            IdentityLinker::new(stores.users.clone(), hasher.clone()),
            issuer.clone(),
        );
        let verification = EmailVerificationManager::new(
            stores.users.clone(),
            stores.tokens.clone(),
            mail.clone(),
            config.frontend_url.clone(),
        );
        let reset = PasswordResetManager::new(
            stores.users,
            stores.sessions,
            stores.tokens,
            hasher,
            mail,
            config.frontend_url.clone(),
        );

        Self {
            auth,
            validator,
            issuer,
            identity,
            verification,
            reset,
        }
    }
}
