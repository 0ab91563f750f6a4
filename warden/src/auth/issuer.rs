//! Credential issuance, refresh rotation and session invalidation.

use std::sync::Arc;

use chrono::Utc;

use super::errors::{AuthError, AuthResult};
use super::generate::opaque_token;
use super::jwt::{TokenSigner, hash_refresh_token, refresh_token_matches};
use super::models::{IssuedCredentials, Session, SessionMetadata, User, UserId};
use crate::db::{SessionRepository, UserRepository};
use crate::mail::{MailQueue, templates};
use crate::risk::{GeoLocation, GeoLocator, RiskAssessment, RiskScorer};

/// Mints credentials and owns the session lifecycle
#[derive(Clone)]
pub struct CredentialIssuer {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    signer: TokenSigner,
    scorer: RiskScorer,
    geo: Arc<dyn GeoLocator>,
    mail: Arc<dyn MailQueue>,
    revoke_on_refresh_mismatch: bool,
}

impl CredentialIssuer {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        signer: TokenSigner,
        geo: Arc<dyn GeoLocator>,
        mail: Arc<dyn MailQueue>,
    ) -> Self {
        Self {
            scorer: RiskScorer::new(sessions.clone()),
            users,
            sessions,
            signer,
            geo,
            mail,
            revoke_on_refresh_mismatch: true,
        }
    }

    /// Whether presenting a stale refresh credential revokes the session
    pub fn revoke_on_refresh_mismatch(mut self, enabled: bool) -> Self {
        self.revoke_on_refresh_mismatch = enabled;
        self
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Issue an access/refresh pair for `user_id`.
    ///
    /// With metadata a new session is scored and stored. Without it the
    /// refresh hash lands on the user row and no session is created; such
    /// credentials cannot be rotated.
    pub async fn issue(
        &self,
        user_id: UserId,
        metadata: Option<&SessionMetadata>,
    ) -> AuthResult<IssuedCredentials> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::not_found("User not found"))?;

        let pair = self.signer.issue_pair(user.id, user.role)?;
        let refresh_hash = hash_refresh_token(&pair.refresh_token);

        let Some(metadata) = metadata else {
            user.refresh_token_hash = Some(refresh_hash);
            self.users.save_user(&user).await?;
            return Ok(IssuedCredentials {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
                session_id: None,
            });
        };

        let location = self.locate(&metadata.ip_address).await;
        let assessment = self
            .scorer
            .assess(
                user.id,
                &metadata.user_agent,
                &metadata.ip_address,
                location.as_ref().map(|l| l.country_code.as_str()),
            )
            .await?;

        let now = Utc::now();
        let session = Session {
            id: opaque_token(&mut rand::rng()),
            user_id: user.id,
            refresh_token_hash: refresh_hash,
            user_agent: metadata.user_agent.clone(),
            ip_address: metadata.ip_address.clone(),
            country_code: location.as_ref().map(|l| l.country_code.clone()),
            latitude: location.as_ref().and_then(|l| l.latitude),
            longitude: location.as_ref().and_then(|l| l.longitude),
            location_label: location.as_ref().map(GeoLocation::label),
            risk_score: assessment.risk_score,
            risk_reasons: assessment.reasons.clone(),
            is_new_location: assessment.is_new_location,
            is_new_device: assessment.is_new_device,
            is_valid: true,
            created_at: now,
            last_used_at: now,
            expires_at: Some(now + self.signer.refresh_ttl()),
        };
        self.sessions.create_session(&session).await?;

        user.last_login = Some(now);
        self.users.save_user(&user).await?;

        if assessment.is_suspicious() {
            self.notify_suspicious(&user, &session, &assessment);
        }

        log::info!(
            "Session created for user {} (risk {})",
            user.id,
            assessment.risk_score
        );

        Ok(IssuedCredentials {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            session_id: Some(session.id),
        })
    }

    /// Exchange a refresh credential for a new pair on the same session
    pub async fn rotate(
        &self,
        session_id: &str,
        presented_refresh: &str,
    ) -> AuthResult<IssuedCredentials> {
        let session = self
            .sessions
            .find_session(session_id)
            .await?
            .ok_or_else(|| AuthError::unauthorized("Session not found"))?;

        let now = Utc::now();
        if !session.is_valid {
            return Err(AuthError::unauthorized("Session revoked"));
        }
        if session.is_expired_at(now) {
            return Err(AuthError::unauthorized("Session expired"));
        }

        if !refresh_token_matches(presented_refresh, &session.refresh_token_hash) {
            if self.revoke_on_refresh_mismatch {
                log::warn!(
                    "Stale refresh token presented for session of user {}; revoking",
                    session.user_id
                );
                self.sessions.invalidate_session(&session.id).await?;
            }
            return Err(AuthError::unauthorized("Invalid refresh token"));
        }

        let claims = self
            .signer
            .verify_refresh(presented_refresh)
            .map_err(|_| AuthError::unauthorized("Invalid refresh token"))?;
        if claims.sub != session.user_id {
            return Err(AuthError::unauthorized("Invalid refresh token"));
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| AuthError::unauthorized("Account not found"))?;
        if let Some(message) = user.inactive_message(now) {
            return Err(AuthError::Unauthorized(message));
        }

        let pair = self.signer.issue_pair(user.id, user.role)?;
        self.sessions
            .update_refresh(
                &session.id,
                &hash_refresh_token(&pair.refresh_token),
                now,
                Some(now + self.signer.refresh_ttl()),
            )
            .await?;

        Ok(IssuedCredentials {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            session_id: Some(session.id),
        })
    }

    /// Mark one session invalid; the row is kept
    pub async fn invalidate(&self, session_id: &str) -> AuthResult<()> {
        self.sessions.invalidate_session(session_id).await
    }

    /// Mark every session of `user_id` invalid
    pub async fn invalidate_all(&self, user_id: UserId) -> AuthResult<u64> {
        let count = self.sessions.invalidate_all_user_sessions(user_id).await?;
        log::info!("Invalidated {} sessions for user {}", count, user_id);
        Ok(count)
    }

    async fn locate(&self, ip: &str) -> Option<GeoLocation> {
        match self.geo.locate(ip).await {
            Ok(location) => Some(location),
            Err(e) => {
                log::debug!("No location for {}: {}", ip, e);
                None
            }
        }
    }

    fn notify_suspicious(&self, user: &User, session: &Session, assessment: &RiskAssessment) {
        log::warn!(
            "Suspicious login for user {} from {} (risk {}): {}",
            user.id,
            session.ip_address,
            assessment.risk_score,
            assessment.reasons.join(", ")
        );

        let Some(email) = user.email.as_deref() else {
            return;
        };
        let notice = templates::LoginNotice {
            username: &user.username,
            ip_address: &session.ip_address,
            user_agent: &session.user_agent,
            location: session.location_label.as_deref(),
            risk_score: assessment.risk_score,
            reasons: &assessment.reasons,
        };
        self.mail.send(templates::suspicious_login_email(email, &notice));
    }
}
