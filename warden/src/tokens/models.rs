//! One-time token models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::UserId;

/// What a one-time token proves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }

    /// How long a freshly issued token stays usable
    pub fn lifetime(&self) -> Duration {
        match self {
            TokenPurpose::EmailVerification => Duration::hours(24),
            TokenPurpose::PasswordReset => Duration::hours(1),
        }
    }
}

/// Single-use secret bound to a user
#[derive(Debug, Clone)]
pub struct OneTimeToken {
    pub token: String,
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    /// Address the token was sent to, for verification tokens
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn new(
        token: String,
        user_id: UserId,
        purpose: TokenPurpose,
        email: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            user_id,
            purpose,
            email,
            expires_at: now + purpose.lifetime(),
            used_at: None,
            created_at: now,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
