//! Authentication manager: registration, login, refresh and session
//! self-management on top of the credential issuer.

use std::sync::Arc;

use chrono::Utc;

use super::{
    email::{normalize_email, validate_email},
    errors::{AuthError, AuthResult},
    generate::MAX_USERNAME_LENGTH,
    issuer::CredentialIssuer,
    models::{
        IssuedCredentials, LoginRequest, NewUser, RegisterRequest, Role, SessionMetadata,
        SessionSummary, User, UserId,
    },
    password::{PasswordHasher, validate_password},
    validator::AuthContext,
};
use crate::access::{ResourceKind, ResourceRegistry};
use crate::db::{SessionRepository, UserRepository};

/// Minimum username length
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Upper bound on sessions returned by [`AuthManager::list_sessions`]
pub const MAX_LISTED_SESSIONS: i64 = 100;

/// Authentication manager
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    hasher: PasswordHasher,
    issuer: CredentialIssuer,
    resources: ResourceRegistry,
}

impl AuthManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        hasher: PasswordHasher,
        issuer: CredentialIssuer,
    ) -> Self {
        Self {
            resources: ResourceRegistry::with_defaults(users.clone(), sessions.clone()),
            users,
            sessions,
            hasher,
            issuer,
        }
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Register a password account.
    ///
    /// Returns credentials issued without a session; the first real login
    /// creates the account's first session.
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<(User, IssuedCredentials)> {
        validate_username(&request.username)?;
        validate_password(&request.password)?;

        let email = match request.email.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(email) => {
                validate_email(email)?;
                Some(normalize_email(email))
            }
        };

        if self.users.find_by_username(&request.username).await?.is_some() {
            return Err(AuthError::bad_request("Username already taken"));
        }
        if let Some(email) = &email
            && self
                .users
                .find_all_by_email(email)
                .await?
                .iter()
                .any(|holder| holder.email_verified)
        {
            return Err(AuthError::bad_request("Email already in use"));
        }

        let password_hash = self.hasher.hash(&request.password)?;
        let user = self
            .users
            .create_user(NewUser {
                username: request.username,
                password_hash: Some(password_hash),
                email,
                email_verified: false,
                provider: None,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                AuthError::Conflict(_) => AuthError::bad_request("Username already taken"),
                other => other,
            })?;

        log::info!("Registered user {} ({})", user.id, user.username);

        let credentials = self.issuer.issue(user.id, None).await?;
        Ok((user, credentials))
    }

    /// Log in with a username or email address and a password
    pub async fn login(
        &self,
        request: LoginRequest,
        metadata: &SessionMetadata,
    ) -> AuthResult<(User, IssuedCredentials)> {
        let identifier = request.identifier.trim();
        let user = if identifier.contains('@') {
            self.users.find_by_email(&normalize_email(identifier)).await?
        } else {
            self.users.find_by_username(identifier).await?
        };

        match user.as_ref().and_then(|u| u.password_hash.as_deref()) {
            Some(password_hash) => self.hasher.verify(&request.password, password_hash)?,
            None => self.hasher.reject(&request.password)?,
        }
        let Some(user) = user else {
            return Err(AuthError::unauthorized("Invalid credentials"));
        };

        if let Some(message) = user.inactive_message(Utc::now()) {
            return Err(AuthError::Unauthorized(message));
        }

        let credentials = self.issuer.issue(user.id, Some(metadata)).await?;
        Ok((user, credentials))
    }

    /// Invalidate the session behind the request, if any
    pub async fn logout(&self, session_id: Option<&str>) -> AuthResult<()> {
        match session_id {
            Some(session_id) if !session_id.is_empty() => self.issuer.invalidate(session_id).await,
            _ => Ok(()),
        }
    }

    /// Rotate the refresh credential of a session
    pub async fn refresh(
        &self,
        session_id: Option<&str>,
        refresh_token: Option<&str>,
    ) -> AuthResult<IssuedCredentials> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::unauthorized("Session required"))?;
        let refresh_token = refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::unauthorized("Refresh token required"))?;
        self.issuer.rotate(session_id, refresh_token).await
    }

    /// Valid, unexpired sessions of a user, newest first
    pub async fn list_sessions(&self, user_id: UserId) -> AuthResult<Vec<SessionSummary>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .recent_valid_sessions(user_id, MAX_LISTED_SESSIONS)
            .await?
            .iter()
            .filter(|s| !s.is_expired_at(now))
            .map(SessionSummary::from)
            .collect())
    }

    /// Revoke one session the caller owns (admins may revoke any)
    pub async fn revoke_session(&self, ctx: &AuthContext, session_id: &str) -> AuthResult<()> {
        self.resources
            .authorize(ctx, ResourceKind::Session, session_id)
            .await?;
        self.issuer.invalidate(session_id).await
    }

    /// Invalidate every session of a user
    pub async fn logout_all(&self, user_id: UserId) -> AuthResult<u64> {
        self.issuer.invalidate_all(user_id).await
    }

    /// Account record of `user_id`, visible to its owner and to admins
    pub async fn account(&self, ctx: &AuthContext, user_id: UserId) -> AuthResult<User> {
        self.resources
            .authorize(ctx, ResourceKind::Account, &user_id.to_string())
            .await?;
        self.current_user(user_id).await
    }

    /// Current account record
    pub async fn current_user(&self, user_id: UserId) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("User not found"))
    }
}

/// Username rules: 3-20 characters of `[A-Za-z0-9_]`
pub fn validate_username(username: &str) -> AuthResult<()> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(AuthError::bad_request(format!(
            "Username must be {MIN_USERNAME_LENGTH}-{MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AuthError::bad_request(
            "Username may only contain letters, digits and underscores",
        ));
    }
    Ok(())
}
