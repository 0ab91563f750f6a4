//! Authentication: credentials, sessions and account login.
//!
//! - Argon2id password hashing with server-side pepper
//! - HS256 access credentials (15 minutes) and refresh credentials (7 days)
//!   signed with separate secrets
//! - One session row per device, with refresh rotation bound to that row
//! - Risk scoring of every session-creating login
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden::auth::{
//!     AuthManager, CredentialIssuer, LoginRequest, PasswordHasher, RegisterRequest,
//!     SessionMetadata, TokenSigner,
//! };
//! use warden::db::InMemoryStore;
//! use warden::mail::LogMailQueue;
//! use warden::risk::DisabledLocator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let signer = TokenSigner::new(
//!         "access-secret-of-at-least-32-bytes!!".to_string(),
//!         "refresh-secret-of-at-least-32-bytes!".to_string(),
//!     );
//!     let issuer = CredentialIssuer::new(
//!         store.clone(),
//!         store.clone(),
//!         signer,
//!         Arc::new(DisabledLocator),
//!         Arc::new(LogMailQueue),
//!     );
//!     let auth = AuthManager::new(
//!         store.clone(),
//!         store,
//!         PasswordHasher::new("pepper-0123456789".to_string()),
//!         issuer,
//!     );
//!
//!     auth.register(RegisterRequest {
//!         username: "ann".to_string(),
//!         password: "x".to_string(),
//!         email: None,
//!     })
//!     .await?;
//!
//!     let (_, credentials) = auth
//!         .login(
//!             LoginRequest { identifier: "ann".to_string(), password: "x".to_string() },
//!             &SessionMetadata::new("Mozilla/5.0", "203.0.113.7"),
//!         )
//!         .await?;
//!     println!("session {:?}", credentials.session_id);
//!     Ok(())
//! }
//! ```

pub mod email;
pub mod errors;
pub mod generate;
pub mod issuer;
pub mod jwt;
pub mod manager;
pub mod models;
pub mod password;
pub mod validator;

pub use errors::{AuthError, AuthResult, ErrorKind};
pub use issuer::CredentialIssuer;
pub use jwt::{TokenPair, TokenSigner};
pub use manager::AuthManager;
pub use models::{
    AccountStatus, Claims, IssuedCredentials, LoginRequest, NewUser, Provider, RegisterRequest,
    Role, Session, SessionId, SessionMetadata, SessionSummary, User, UserId,
};
pub use password::PasswordHasher;
pub use validator::{AuthContext, SessionValidator};
