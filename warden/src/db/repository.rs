//! Repository trait definitions for testability and dependency injection.
//!
//! This module provides trait-based abstractions over the relational store,
//! with PostgreSQL implementations. Uniqueness (username, provider ids,
//! verified email, token strings) is enforced by the schema; violations
//! surface as [`AuthError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::auth::{AuthError, AuthResult, NewUser, Provider, Session, User, UserId};
use crate::tokens::{OneTimeToken, TokenPurpose};

/// Trait for user repository operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create_user(&self, user: NewUser) -> AuthResult<User>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Find user by username
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Find the account holding `email` (case-insensitive), preferring a verified holder
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Every account currently holding `email` (case-insensitive)
    async fn find_all_by_email(&self, email: &str) -> AuthResult<Vec<User>>;

    /// Find user linked to an external provider id
    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> AuthResult<Option<User>>;

    /// Persist every mutable field of `user`
    async fn save_user(&self, user: &User) -> AuthResult<()>;
}

/// Trait for session repository operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create_session(&self, session: &Session) -> AuthResult<()>;

    /// Find session by ID
    async fn find_session(&self, session_id: &str) -> AuthResult<Option<Session>>;

    /// Valid sessions for a user, newest first
    async fn recent_valid_sessions(&self, user_id: UserId, limit: i64)
    -> AuthResult<Vec<Session>>;

    /// Replace the refresh hash of a session after rotation
    async fn update_refresh(
        &self,
        session_id: &str,
        refresh_token_hash: &str,
        last_used_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()>;

    /// Invalidate session
    async fn invalidate_session(&self, session_id: &str) -> AuthResult<()>;

    /// Invalidate all sessions for a user, returning how many were valid
    async fn invalidate_all_user_sessions(&self, user_id: UserId) -> AuthResult<u64>;
}

/// Trait for one-time token repository operations
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Delete unused tokens of `purpose` for a user
    async fn delete_outstanding(&self, user_id: UserId, purpose: TokenPurpose) -> AuthResult<u64>;

    /// Store a new token
    async fn insert_token(&self, token: &OneTimeToken) -> AuthResult<()>;

    /// Look a token up by its secret value
    async fn find_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> AuthResult<Option<OneTimeToken>>;

    /// Mark a token used
    async fn mark_used(&self, token: &str, used_at: DateTime<Utc>) -> AuthResult<()>;
}

fn map_unique_violation(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AuthError::Conflict(match db.constraint() {
                Some(constraint) => format!("Already in use ({constraint})"),
                None => "Already in use".to_string(),
            })
        }
        _ => AuthError::Database(err),
    }
}

const USER_COLUMNS: &str = "id, username, password_hash, email, pending_email, email_verified,
    email_verified_at, google_id, github_id, role, status, status_expires_at, status_reason,
    refresh_token_hash, created_at, last_login";

fn user_from_row(r: &PgRow) -> AuthResult<User> {
    Ok(User {
        id: r.get("id"),
        username: r.get("username"),
        password_hash: r.get("password_hash"),
        email: r.get("email"),
        pending_email: r.get("pending_email"),
        email_verified: r.get("email_verified"),
        email_verified_at: r.get("email_verified_at"),
        google_id: r.get("google_id"),
        github_id: r.get("github_id"),
        role: r.get::<String, _>("role").parse()?,
        status: r.get::<String, _>("status").parse()?,
        status_expires_at: r.get("status_expires_at"),
        status_reason: r.get("status_reason"),
        refresh_token_hash: r.get("refresh_token_hash"),
        created_at: r.get("created_at"),
        last_login: r.get("last_login"),
    })
}

fn provider_column(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "google_id",
        Provider::Github => "github_id",
    }
}

/// PostgreSQL implementation of `UserRepository`
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(&self, user: NewUser) -> AuthResult<User> {
        let (google_id, github_id) = match &user.provider {
            Some((Provider::Google, id)) => (Some(id.clone()), None),
            Some((Provider::Github, id)) => (None, Some(id.clone())),
            None => (None, None),
        };

        let row = sqlx::query(&format!(
            "INSERT INTO users (username, password_hash, email, email_verified, email_verified_at,
                                google_id, github_id, role)
             VALUES ($1, $2, $3, $4, CASE WHEN $4 THEN NOW() END, $5, $6, $7)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(google_id)
        .bind(github_id)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        user_from_row(&row)
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)
             ORDER BY email_verified DESC, id ASC LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_all_by_email(&self, email: &str) -> AuthResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1) ORDER BY id"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1",
            provider_column(provider)
        ))
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn save_user(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            "UPDATE users SET username = $2, password_hash = $3, email = $4, pending_email = $5,
                email_verified = $6, email_verified_at = $7, google_id = $8, github_id = $9,
                role = $10, status = $11, status_expires_at = $12, status_reason = $13,
                refresh_token_hash = $14, last_login = $15
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(&user.pending_email)
        .bind(user.email_verified)
        .bind(user.email_verified_at)
        .bind(&user.google_id)
        .bind(&user.github_id)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.status_expires_at)
        .bind(&user.status_reason)
        .bind(&user.refresh_token_hash)
        .bind(user.last_login)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Ok(())
    }
}

const SESSION_COLUMNS: &str = "id, user_id, refresh_token_hash, user_agent, ip_address,
    country_code, latitude, longitude, location_label, risk_score, risk_reasons,
    is_new_location, is_new_device, is_valid, created_at, last_used_at, expires_at";

fn session_from_row(r: &PgRow) -> Session {
    Session {
        id: r.get("id"),
        user_id: r.get("user_id"),
        refresh_token_hash: r.get("refresh_token_hash"),
        user_agent: r.get("user_agent"),
        ip_address: r.get("ip_address"),
        country_code: r.get("country_code"),
        latitude: r.get("latitude"),
        longitude: r.get("longitude"),
        location_label: r.get("location_label"),
        risk_score: r.get::<i16, _>("risk_score").clamp(0, 100) as u8,
        risk_reasons: r.get("risk_reasons"),
        is_new_location: r.get("is_new_location"),
        is_new_device: r.get("is_new_device"),
        is_valid: r.get("is_valid"),
        created_at: r.get("created_at"),
        last_used_at: r.get("last_used_at"),
        expires_at: r.get("expires_at"),
    }
}

/// PostgreSQL implementation of `SessionRepository`
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create_session(&self, session: &Session) -> AuthResult<()> {
        sqlx::query(&format!(
            "INSERT INTO sessions ({SESSION_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(&session.country_code)
        .bind(session.latitude)
        .bind(session.longitude)
        .bind(&session.location_label)
        .bind(i16::from(session.risk_score))
        .bind(&session.risk_reasons)
        .bind(session.is_new_location)
        .bind(session.is_new_device)
        .bind(session.is_valid)
        .bind(session.created_at)
        .bind(session.last_used_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> AuthResult<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn recent_valid_sessions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> AuthResult<Vec<Session>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = $1 AND is_valid = TRUE
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn update_refresh(
        &self,
        session_id: &str,
        refresh_token_hash: &str,
        last_used_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()> {
        sqlx::query(
            "UPDATE sessions SET refresh_token_hash = $2, last_used_at = $3, expires_at = $4
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(refresh_token_hash)
        .bind(last_used_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn invalidate_session(&self, session_id: &str) -> AuthResult<()> {
        sqlx::query("UPDATE sessions SET is_valid = FALSE WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn invalidate_all_user_sessions(&self, user_id: UserId) -> AuthResult<u64> {
        let result =
            sqlx::query("UPDATE sessions SET is_valid = FALSE WHERE user_id = $1 AND is_valid")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

fn token_from_row(r: &PgRow, purpose: TokenPurpose) -> OneTimeToken {
    OneTimeToken {
        token: r.get("token"),
        user_id: r.get("user_id"),
        purpose,
        email: r.get("email"),
        expires_at: r.get("expires_at"),
        used_at: r.get("used_at"),
        created_at: r.get("created_at"),
    }
}

/// PostgreSQL implementation of `TokenRepository`
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn delete_outstanding(&self, user_id: UserId, purpose: TokenPurpose) -> AuthResult<u64> {
        let result = sqlx::query(
            "DELETE FROM one_time_tokens WHERE user_id = $1 AND purpose = $2 AND used_at IS NULL",
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_token(&self, token: &OneTimeToken) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO one_time_tokens (token, user_id, purpose, email, expires_at, used_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.purpose.as_str())
        .bind(&token.email)
        .bind(token.expires_at)
        .bind(token.used_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Ok(())
    }

    async fn find_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> AuthResult<Option<OneTimeToken>> {
        let row = sqlx::query(
            "SELECT token, user_id, email, expires_at, used_at, created_at
             FROM one_time_tokens WHERE token = $1 AND purpose = $2",
        )
        .bind(token)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(|r| token_from_row(r, purpose)))
    }

    async fn mark_used(&self, token: &str, used_at: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE one_time_tokens SET used_at = $2 WHERE token = $1 AND used_at IS NULL")
            .bind(token)
            .bind(used_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
