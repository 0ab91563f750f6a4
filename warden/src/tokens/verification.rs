//! Email ownership proof tokens.

use std::sync::Arc;

use chrono::Utc;

use super::models::{OneTimeToken, TokenPurpose};
use crate::auth::email::{claim_email, normalize_email, same_address, validate_email};
use crate::auth::generate::opaque_token;
use crate::auth::{AuthError, AuthResult, User, UserId};
use crate::db::{TokenRepository, UserRepository};
use crate::mail::{MailQueue, templates};

/// Issues and redeems email verification tokens
#[derive(Clone)]
pub struct EmailVerificationManager {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    mail: Arc<dyn MailQueue>,
    base_url: String,
}

impl EmailVerificationManager {
    /// `base_url` is the frontend origin that verification links point at
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        mail: Arc<dyn MailQueue>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            tokens,
            mail,
            base_url: base_url.into(),
        }
    }

    /// Send a verification link to the account's current address
    pub async fn send_verification(&self, user_id: UserId) -> AuthResult<()> {
        let user = self.load_user(user_id).await?;
        let email = user
            .email
            .clone()
            .ok_or_else(|| AuthError::bad_request("No email address on account"))?;
        if user.email_verified {
            return Err(AuthError::bad_request("Email already verified"));
        }

        self.issue(&user, &email).await
    }

    /// Record `new_email` as pending and send a verification link to it.
    ///
    /// The current address stays in place until the link is used.
    pub async fn request_email_change(&self, user_id: UserId, new_email: &str) -> AuthResult<()> {
        let new_email = normalize_email(new_email);
        validate_email(&new_email)?;

        let mut user = self.load_user(user_id).await?;
        if user.email_verified
            && user
                .email
                .as_deref()
                .is_some_and(|current| same_address(current, &new_email))
        {
            return Err(AuthError::bad_request("Email already verified"));
        }
        if self
            .users
            .find_all_by_email(&new_email)
            .await?
            .iter()
            .any(|holder| holder.id != user.id && holder.email_verified)
        {
            return Err(AuthError::bad_request("Email already verified by another user"));
        }

        user.pending_email = Some(new_email.clone());
        self.users.save_user(&user).await?;

        self.issue(&user, &new_email).await
    }

    /// Redeem a verification token, returning the updated account.
    ///
    /// Redeeming an already used token succeeds as long as the account
    /// ended up verified.
    pub async fn verify(&self, token: &str) -> AuthResult<User> {
        let stored = self
            .tokens
            .find_token(token, TokenPurpose::EmailVerification)
            .await?
            .ok_or_else(|| AuthError::bad_request("Invalid verification token"))?;
        let mut user = self
            .users
            .find_by_id(stored.user_id)
            .await?
            .ok_or_else(|| AuthError::bad_request("Invalid verification token"))?;

        let now = Utc::now();
        if stored.is_used() {
            if user.email_verified {
                return Ok(user);
            }
            return Err(AuthError::bad_request("Verification token already used"));
        }
        if stored.is_expired_at(now) {
            return Err(AuthError::bad_request("Verification token expired"));
        }

        let captured = match stored.email.clone().or_else(|| user.email.clone()) {
            Some(email) => email,
            None => return Err(AuthError::bad_request("No email address on account")),
        };
        let still_current = [user.email.as_deref(), user.pending_email.as_deref()]
            .into_iter()
            .flatten()
            .any(|address| same_address(address, &captured));
        if !still_current {
            return Err(AuthError::bad_request(
                "Email has changed since this token was issued",
            ));
        }

        claim_email(self.users.as_ref(), &mut user, &captured, now).await?;
        self.users.save_user(&user).await?;
        self.tokens.mark_used(token, now).await?;

        log::info!("Verified email for user {}", user.id);
        Ok(user)
    }

    async fn load_user(&self, user_id: UserId) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("User not found"))
    }

    async fn issue(&self, user: &User, email: &str) -> AuthResult<()> {
        let now = Utc::now();
        self.tokens
            .delete_outstanding(user.id, TokenPurpose::EmailVerification)
            .await?;

        let token = OneTimeToken::new(
            opaque_token(&mut rand::rng()),
            user.id,
            TokenPurpose::EmailVerification,
            Some(email.to_string()),
            now,
        );
        self.tokens.insert_token(&token).await?;

        self.mail.send(templates::verification_email(
            email,
            &user.username,
            &self.base_url,
            &token.token,
        ));
        Ok(())
    }
}
