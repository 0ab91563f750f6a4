//! Signed access/refresh credentials and refresh-credential hashing.
//!
//! Access and refresh credentials are both HS256 JWTs carrying the same
//! [`Claims`], signed with different secrets so one can never be presented
//! as the other. Only the SHA-256 of a refresh credential is persisted.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::errors::AuthResult;
use super::models::{Claims, Role, UserId};

/// Default access credential lifetime (15 minutes)
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;

/// Default refresh credential lifetime (7 days)
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Signing keys and lifetimes for both credential kinds
#[derive(Clone)]
pub struct TokenSigner {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

/// A freshly minted access/refresh pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenSigner {
    pub fn new(access_secret: String, refresh_secret: String) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
            refresh_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
        }
    }

    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access and a refresh credential for `user_id`
    pub fn issue_pair(&self, user_id: UserId, role: Role) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: sign(user_id, role, self.access_ttl, &self.access_secret)?,
            refresh_token: sign(user_id, role, self.refresh_ttl, &self.refresh_secret)?,
        })
    }

    /// Decode an access credential, validating signature and expiry
    pub fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        verify(token, &self.access_secret)
    }

    /// Decode a refresh credential, validating signature and expiry
    pub fn verify_refresh(&self, token: &str) -> AuthResult<Claims> {
        verify(token, &self.refresh_secret)
    }
}

fn sign(user_id: UserId, role: Role, ttl: Duration, secret: &str) -> AuthResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        role,
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

fn verify(token: &str, secret: &str) -> AuthResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Compute the SHA-256 hex digest of a refresh credential
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time check of a presented refresh credential against a stored hash
pub fn refresh_token_matches(token: &str, stored_hash: &str) -> bool {
    let presented = hash_refresh_token(token);
    presented.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
