//! # Warden
//!
//! Credential and session authority: issues and validates login
//! credentials, keeps one session record per device, rotates refresh
//! credentials, scores logins for anomalies and merges federated identities
//! into local accounts.
//!
//! ## Modules
//!
//! - [`auth`]: credential issuance, session validation, password login
//! - [`risk`]: geolocation and login risk scoring
//! - [`identity`]: Google/GitHub providers and account linking
//! - [`tokens`]: email verification and password reset tokens
//! - [`mail`]: fire-and-forget mail queue and message bodies
//! - [`access`]: resource ownership registry
//! - [`db`]: repository traits with PostgreSQL and in-memory stores
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use warden::{Stores, Warden, WardenConfig};
//! use warden::db::InMemoryStore;
//! use warden::identity::ProviderRegistry;
//! use warden::mail::LogMailQueue;
//! use warden::risk::DisabledLocator;
//!
//! let config = WardenConfig::new(
//!     "access-secret-of-at-least-32-bytes!!".to_string(),
//!     "refresh-secret-of-at-least-32-bytes!".to_string(),
//!     "pepper-0123456789".to_string(),
//! );
//! let warden = Warden::new(
//!     &config,
//!     Stores::memory(Arc::new(InMemoryStore::new())),
//!     Arc::new(DisabledLocator),
//!     Arc::new(LogMailQueue),
//!     ProviderRegistry::new(),
//! );
//! assert!(warden.identity.providers().is_empty());
//! ```

pub mod access;
pub mod auth;
pub mod db;
pub mod identity;
pub mod mail;
pub mod risk;
pub mod service;
pub mod tokens;

pub use auth::{AuthContext, AuthError, AuthResult, ErrorKind};
pub use service::{Stores, Warden, WardenConfig};
