//! Password reset tokens.

use std::sync::Arc;

use chrono::Utc;

use super::models::{OneTimeToken, TokenPurpose};
use crate::auth::email::normalize_email;
use crate::auth::generate::opaque_token;
use crate::auth::password::validate_password;
use crate::auth::{AuthError, AuthResult, PasswordHasher, User};
use crate::db::{SessionRepository, TokenRepository, UserRepository};
use crate::mail::{MailQueue, templates};

/// Response to every reset request, whether or not the account exists
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent";

/// Issues and redeems password reset tokens
#[derive(Clone)]
pub struct PasswordResetManager {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    tokens: Arc<dyn TokenRepository>,
    hasher: PasswordHasher,
    mail: Arc<dyn MailQueue>,
    base_url: String,
}

impl PasswordResetManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        tokens: Arc<dyn TokenRepository>,
        hasher: PasswordHasher,
        mail: Arc<dyn MailQueue>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            hasher,
            mail,
            base_url: base_url.into(),
        }
    }

    /// Start a reset for `email`.
    ///
    /// The returned message never depends on whether an account matched;
    /// failures after the lookup are logged instead of returned.
    pub async fn request(&self, email: &str) -> AuthResult<&'static str> {
        let email = normalize_email(email);
        let user = self.users.find_by_email(&email).await?;

        match user {
            Some(user) if user.password_hash.is_some() && user.is_active_at(Utc::now()) => {
                if let Err(e) = self.issue(&user, &email).await {
                    log::error!("Failed to issue reset token for user {}: {}", user.id, e);
                }
            }
            Some(user) => log::info!("Ignoring reset request for ineligible user {}", user.id),
            None => log::debug!("Reset requested for unknown email"),
        }

        Ok(RESET_REQUESTED_MESSAGE)
    }

    /// Set a new password with a reset token and sign out every session
    pub async fn reset(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let stored = self
            .tokens
            .find_token(token, TokenPurpose::PasswordReset)
            .await?
            .ok_or_else(|| AuthError::bad_request("Invalid reset token"))?;

        let now = Utc::now();
        if stored.is_used() {
            return Err(AuthError::bad_request("Reset token already used"));
        }
        if stored.is_expired_at(now) {
            return Err(AuthError::bad_request("Reset token expired"));
        }
        validate_password(new_password)?;

        let mut user = self
            .users
            .find_by_id(stored.user_id)
            .await?
            .ok_or_else(|| AuthError::bad_request("Invalid reset token"))?;

        user.password_hash = Some(self.hasher.hash(new_password)?);
        user.refresh_token_hash = None;
        self.users.save_user(&user).await?;
        self.tokens.mark_used(token, now).await?;

        let revoked = self.sessions.invalidate_all_user_sessions(user.id).await?;
        log::info!(
            "Password reset for user {}; {} sessions invalidated",
            user.id,
            revoked
        );
        Ok(())
    }

    async fn issue(&self, user: &User, email: &str) -> AuthResult<()> {
        let now = Utc::now();
        self.tokens
            .delete_outstanding(user.id, TokenPurpose::PasswordReset)
            .await?;

        let token = OneTimeToken::new(
            opaque_token(&mut rand::rng()),
            user.id,
            TokenPurpose::PasswordReset,
            None,
            now,
        );
        self.tokens.insert_token(&token).await?;

        self.mail.send(templates::password_reset_email(
            email,
            &user.username,
            &self.base_url,
            &token.token,
        ));
        Ok(())
    }
}
