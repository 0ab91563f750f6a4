//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::AuthError;

/// User ID type
pub type UserId = i64;

/// Opaque session identifier
pub type SessionId = String;

/// Account role carried in every credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(AuthError::bad_request(format!("Unknown role: {other}"))),
        }
    }
}

/// Lifecycle state of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Banned => "banned",
            AccountStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "banned" => Ok(AccountStatus::Banned),
            "deleted" => Ok(AccountStatus::Deleted),
            other => Err(AuthError::bad_request(format!(
                "Unknown account status: {other}"
            ))),
        }
    }
}

/// External identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Github];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(AuthError::bad_request(format!(
                "Unsupported identity provider: {other}"
            ))),
        }
    }
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email: Option<String>,
    /// Address awaiting verification before it replaces `email`
    pub pending_email: Option<String>,
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub status_expires_at: Option<DateTime<Utc>>,
    pub status_reason: Option<String>,
    /// Hash of a refresh credential issued without a session
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Github => self.github_id.as_deref(),
        }
    }

    pub fn set_provider_id(&mut self, provider: Provider, provider_id: String) {
        match provider {
            Provider::Google => self.google_id = Some(provider_id),
            Provider::Github => self.github_id = Some(provider_id),
        }
    }

    /// Whether the account may authenticate at `now`.
    ///
    /// A suspension whose expiry has passed no longer blocks the account.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AccountStatus::Active => true,
            AccountStatus::Suspended => self.status_expires_at.is_some_and(|until| until <= now),
            AccountStatus::Banned | AccountStatus::Deleted => false,
        }
    }

    /// Status-specific rejection message, or `None` when the account is active.
    pub fn inactive_message(&self, now: DateTime<Utc>) -> Option<String> {
        if self.is_active_at(now) {
            return None;
        }

        let base = match (self.status, self.status_expires_at) {
            (AccountStatus::Suspended, Some(until)) => {
                format!("Account suspended until {}", until.to_rfc3339())
            }
            (AccountStatus::Suspended, None) => "Account suspended".to_string(),
            (AccountStatus::Banned, _) => "Account banned".to_string(),
            (AccountStatus::Deleted, _) => "Account deleted".to_string(),
            (AccountStatus::Active, _) => return None,
        };

        Some(match &self.status_reason {
            Some(reason) => format!("{base}: {reason}"),
            None => base,
        })
    }
}

/// Fields required to insert a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub provider: Option<(Provider, String)>,
    pub role: Role,
}

/// Client device details captured at login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub user_agent: String,
    pub ip_address: String,
}

impl SessionMetadata {
    pub fn new(user_agent: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
        }
    }
}

/// Session model
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub refresh_token_hash: String,
    pub user_agent: String,
    pub ip_address: String,
    pub country_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_label: Option<String>,
    pub risk_score: u8,
    pub risk_reasons: Vec<String>,
    pub is_new_location: bool,
    pub is_new_device: bool,
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Client-facing view of a session, without the credential hash
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub user_agent: String,
    pub ip_address: String,
    pub location: Option<String>,
    pub risk_score: u8,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            user_agent: session.user_agent.clone(),
            ip_address: session.ip_address.clone(),
            location: session.location_label.clone(),
            risk_score: session.risk_score,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
        }
    }
}

/// JWT claims shared by access and refresh credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
    /// Unique per credential so that no two issued tokens are equal
    pub jti: String,
}

/// Credentials handed back to the client
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Present only when a session row was created
    pub session_id: Option<SessionId>,
}

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

/// User login request; `identifier` is a username or an email address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user_with_status(status: AccountStatus) -> User {
        User {
            id: 1,
            username: "ann".to_string(),
            password_hash: None,
            email: None,
            pending_email: None,
            email_verified: false,
            email_verified_at: None,
            google_id: None,
            github_id: None,
            role: Role::User,
            status,
            status_expires_at: None,
            status_reason: None,
            refresh_token_hash: None,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn test_expired_suspension_counts_as_active() {
        let now = Utc::now();
        let mut user = user_with_status(AccountStatus::Suspended);
        user.status_expires_at = Some(now - Duration::hours(1));
        assert!(user.is_active_at(now));
        assert!(user.inactive_message(now).is_none());
    }

    #[test]
    fn test_inactive_message_includes_reason() {
        let now = Utc::now();
        let mut user = user_with_status(AccountStatus::Banned);
        user.status_reason = Some("spam".to_string());
        assert_eq!(user.inactive_message(now).as_deref(), Some("Account banned: spam"));

        let mut user = user_with_status(AccountStatus::Suspended);
        user.status_expires_at = Some(now + Duration::days(1));
        let message = user.inactive_message(now).unwrap();
        assert!(message.starts_with("Account suspended until"));
    }

    #[test]
    fn test_provider_round_trip_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert!("myspace".parse::<Provider>().is_err());
    }
}
