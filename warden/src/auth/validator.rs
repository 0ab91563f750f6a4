//! Per-request validation of an access credential against its session.

use std::sync::Arc;

use chrono::Utc;

use super::errors::{AuthError, AuthResult};
use super::jwt::TokenSigner;
use super::models::{Claims, Role, SessionId, UserId};
use crate::db::{SessionRepository, UserRepository};

/// Authenticated identity attached to a request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub session_id: SessionId,
}

impl AuthContext {
    pub fn user_id(&self) -> UserId {
        self.claims.sub
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn is_admin(&self) -> bool {
        self.claims.role == Role::Admin
    }

    /// Reject unless the caller holds `role`; admins satisfy every role
    pub fn require_role(&self, role: Role) -> AuthResult<()> {
        if self.claims.role == role || self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::unauthorized("Insufficient permissions"))
        }
    }
}

/// Checks that an access credential is bound to a live session
#[derive(Clone)]
pub struct SessionValidator {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    signer: TokenSigner,
}

impl SessionValidator {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        signer: TokenSigner,
    ) -> Self {
        Self {
            users,
            sessions,
            signer,
        }
    }

    /// Validate the credential pair carried by a request.
    ///
    /// The session id is checked for presence before the access
    /// credential is decoded.
    pub async fn validate(
        &self,
        access_token: Option<&str>,
        session_id: Option<&str>,
    ) -> AuthResult<AuthContext> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::unauthorized("Session required"))?;
        let access_token = access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::unauthorized("Access token required"))?;

        let claims = self
            .signer
            .verify_access(access_token)
            .map_err(|_| AuthError::unauthorized("Invalid access token"))?;

        let session = self
            .sessions
            .find_session(session_id)
            .await?
            .ok_or_else(|| AuthError::unauthorized("Session not found"))?;

        let now = Utc::now();
        if session.user_id != claims.sub {
            log::warn!(
                "Access token for user {} presented with a session of user {}",
                claims.sub,
                session.user_id
            );
            return Err(AuthError::unauthorized("Session not found"));
        }
        if !session.is_valid {
            return Err(AuthError::unauthorized("Session revoked"));
        }
        if session.is_expired_at(now) {
            return Err(AuthError::unauthorized("Session expired"));
        }

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AuthError::unauthorized("Account not found"))?;
        if let Some(message) = user.inactive_message(now) {
            return Err(AuthError::Unauthorized(message));
        }

        Ok(AuthContext {
            claims,
            session_id: session.id,
        })
    }
}
