//! Resource ownership checks.
//!
//! A [`ResourceRegistry`] maps each [`ResourceKind`] to an
//! [`OwnershipLookup`] that reports who owns a given resource id. Admins
//! pass every check; everyone else must own the resource. A resource that
//! is missing and one owned by someone else are indistinguishable to the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{AuthContext, AuthError, AuthResult, UserId};
use crate::db::{SessionRepository, UserRepository};

/// Kinds of resource with an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Session,
    Account,
    /// Resource types registered by embedding applications
    Custom(&'static str),
}

/// Resolves the owner of a resource id
#[async_trait]
pub trait OwnershipLookup: Send + Sync {
    async fn owner_of(&self, resource_id: &str) -> AuthResult<Option<UserId>>;
}

/// Sessions are owned by the user they were issued to
pub struct SessionOwnership {
    sessions: Arc<dyn SessionRepository>,
}

impl SessionOwnership {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl OwnershipLookup for SessionOwnership {
    async fn owner_of(&self, resource_id: &str) -> AuthResult<Option<UserId>> {
        Ok(self
            .sessions
            .find_session(resource_id)
            .await?
            .map(|s| s.user_id))
    }
}

/// Accounts are owned by themselves
pub struct AccountOwnership {
    users: Arc<dyn UserRepository>,
}

impl AccountOwnership {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl OwnershipLookup for AccountOwnership {
    async fn owner_of(&self, resource_id: &str) -> AuthResult<Option<UserId>> {
        let Ok(user_id) = resource_id.parse::<UserId>() else {
            return Ok(None);
        };
        Ok(self.users.find_by_id(user_id).await?.map(|u| u.id))
    }
}

/// Typed table of ownership accessors
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    lookups: HashMap<ResourceKind, Arc<dyn OwnershipLookup>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the session and account lookups installed
    pub fn with_defaults(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(ResourceKind::Session, Arc::new(SessionOwnership::new(sessions)));
        registry.register(ResourceKind::Account, Arc::new(AccountOwnership::new(users)));
        registry
    }

    pub fn register(&mut self, kind: ResourceKind, lookup: Arc<dyn OwnershipLookup>) {
        self.lookups.insert(kind, lookup);
    }

    /// Allow the request if the caller is an admin or owns the resource
    pub async fn authorize(
        &self,
        ctx: &AuthContext,
        kind: ResourceKind,
        resource_id: &str,
    ) -> AuthResult<()> {
        let lookup = self
            .lookups
            .get(&kind)
            .ok_or_else(|| AuthError::bad_request(format!("Unknown resource kind: {kind:?}")))?;

        let owner = lookup.owner_of(resource_id).await?;
        if ctx.is_admin() && owner.is_some() {
            return Ok(());
        }

        match owner {
            Some(owner) if owner == ctx.user_id() => Ok(()),
            _ => Err(AuthError::not_found("Resource not found")),
        }
    }
}
