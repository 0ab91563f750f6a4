//! In-memory store implementing every repository trait.
//!
//! Mirrors the uniqueness rules of the PostgreSQL schema so that flows
//! exercised against it behave like they do against the database. Used by
//! the test suites and by the server's development mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::repository::{SessionRepository, TokenRepository, UserRepository};
use crate::auth::{
    AccountStatus, AuthError, AuthResult, NewUser, Provider, Session, User, UserId,
};
use crate::tokens::{OneTimeToken, TokenPurpose};

/// In-memory users, sessions and one-time tokens
pub struct InMemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    sessions: RwLock<HashMap<String, Session>>,
    tokens: RwLock<HashMap<String, OneTimeToken>>,
    next_user_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            next_user_id: AtomicI64::new(1),
        }
    }

    /// Number of stored users
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Every session ever stored for a user, valid or not
    pub async fn all_sessions_for(&self, user_id: UserId) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Outstanding tokens of a user for one purpose
    pub async fn tokens_for(&self, user_id: UserId, purpose: TokenPurpose) -> Vec<OneTimeToken> {
        self.tokens
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id && t.purpose == purpose)
            .cloned()
            .collect()
    }

    /// Overwrite a token's expiry (tests age tokens with this)
    pub async fn set_token_expiry(&self, token: &str, expires_at: DateTime<Utc>) {
        if let Some(stored) = self.tokens.write().await.get_mut(token) {
            stored.expires_at = expires_at;
        }
    }

    /// Overwrite a session's expiry
    pub async fn set_session_expiry(&self, session_id: &str, expires_at: Option<DateTime<Utc>>) {
        if let Some(stored) = self.sessions.write().await.get_mut(session_id) {
            stored.expires_at = expires_at;
        }
    }
}

fn same_email(a: &Option<String>, b: &str) -> bool {
    a.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(b))
}

/// Check `candidate` against every other stored user
fn check_unique(users: &HashMap<UserId, User>, candidate: &User) -> AuthResult<()> {
    for other in users.values().filter(|u| u.id != candidate.id) {
        if other.username == candidate.username {
            return Err(AuthError::Conflict("Username already taken".to_string()));
        }
        for provider in Provider::ALL {
            if let Some(id) = candidate.provider_id(provider)
                && other.provider_id(provider) == Some(id)
            {
                return Err(AuthError::Conflict(format!(
                    "{provider} account already linked"
                )));
            }
        }
        if candidate.email_verified
            && other.email_verified
            && let Some(email) = &candidate.email
            && same_email(&other.email, email)
        {
            return Err(AuthError::Conflict("Email already verified".to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, new_user: NewUser) -> AuthResult<User> {
        let mut users = self.users.write().await;
        let now = Utc::now();

        let mut user = User {
            id: 0,
            username: new_user.username,
            password_hash: new_user.password_hash,
            email: new_user.email,
            pending_email: None,
            email_verified: new_user.email_verified,
            email_verified_at: new_user.email_verified.then_some(now),
            google_id: None,
            github_id: None,
            role: new_user.role,
            status: AccountStatus::Active,
            status_expires_at: None,
            status_reason: None,
            refresh_token_hash: None,
            created_at: now,
            last_login: None,
        };
        if let Some((provider, provider_id)) = new_user.provider {
            user.set_provider_id(provider, provider_id);
        }

        check_unique(&users, &user)?;
        user.id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let mut holders = self.find_all_by_email(email).await?;
        holders.sort_by_key(|u| (!u.email_verified, u.id));
        Ok(holders.into_iter().next())
    }

    async fn find_all_by_email(&self, email: &str) -> AuthResult<Vec<User>> {
        let users = self.users.read().await;
        let mut holders: Vec<User> = users
            .values()
            .filter(|u| same_email(&u.email, email))
            .cloned()
            .collect();
        holders.sort_by_key(|u| u.id);
        Ok(holders)
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> AuthResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.provider_id(provider) == Some(provider_id))
            .cloned())
    }

    async fn save_user(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(AuthError::not_found("User not found"));
        }
        check_unique(&users, user)?;
        users.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn create_session(&self, session: &Session) -> AuthResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(AuthError::Conflict("Session id already exists".to_string()));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> AuthResult<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn recent_valid_sessions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> AuthResult<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut valid: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_valid)
            .cloned()
            .collect();
        valid.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        valid.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(valid)
    }

    async fn update_refresh(
        &self,
        session_id: &str,
        refresh_token_hash: &str,
        last_used_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()> {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.refresh_token_hash = refresh_token_hash.to_string();
            session.last_used_at = last_used_at;
            session.expires_at = expires_at;
        }
        Ok(())
    }

    async fn invalidate_session(&self, session_id: &str) -> AuthResult<()> {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.is_valid = false;
        }
        Ok(())
    }

    async fn invalidate_all_user_sessions(&self, user_id: UserId) -> AuthResult<u64> {
        let mut count = 0;
        for session in self.sessions.write().await.values_mut() {
            if session.user_id == user_id && session.is_valid {
                session.is_valid = false;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl TokenRepository for InMemoryStore {
    async fn delete_outstanding(&self, user_id: UserId, purpose: TokenPurpose) -> AuthResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !(t.user_id == user_id && t.purpose == purpose && !t.is_used()));
        Ok((before - tokens.len()) as u64)
    }

    async fn insert_token(&self, token: &OneTimeToken) -> AuthResult<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token) {
            return Err(AuthError::Conflict("Token already exists".to_string()));
        }
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> AuthResult<Option<OneTimeToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(token).filter(|t| t.purpose == purpose).cloned())
    }

    async fn mark_used(&self, token: &str, used_at: DateTime<Utc>) -> AuthResult<()> {
        if let Some(stored) = self.tokens.write().await.get_mut(token)
            && stored.used_at.is_none()
        {
            stored.used_at = Some(used_at);
        }
        Ok(())
    }
}
