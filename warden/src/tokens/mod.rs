//! Single-use email verification and password reset tokens.

pub mod models;
pub mod reset;
pub mod verification;

pub use models::{OneTimeToken, TokenPurpose};
pub use reset::{PasswordResetManager, RESET_REQUESTED_MESSAGE};
pub use verification::EmailVerificationManager;
