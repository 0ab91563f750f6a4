//! Email address validation and claiming.
//!
//! A verified address belongs to exactly one account. Unverified holders of
//! the same address lose it as soon as someone verifies it.

use chrono::{DateTime, Utc};

use super::errors::{AuthError, AuthResult};
use super::models::User;
use crate::db::UserRepository;

/// Maximum accepted email length
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Trim and lowercase an address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Cheap structural check: one `@`, non-empty local part, dotted domain
pub fn validate_email(email: &str) -> AuthResult<()> {
    let invalid = || AuthError::bad_request("Invalid email address");
    if email.len() > MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Make `email` the verified address of `user`.
///
/// Fails if another account already holds it verified; strips it from any
/// other unverified holder. `user` is updated in place and must be saved by
/// the caller.
pub async fn claim_email(
    users: &dyn UserRepository,
    user: &mut User,
    email: &str,
    now: DateTime<Utc>,
) -> AuthResult<()> {
    let holders = users.find_all_by_email(email).await?;

    if holders
        .iter()
        .any(|other| other.id != user.id && other.email_verified)
    {
        return Err(AuthError::bad_request("Email already verified by another user"));
    }

    for mut other in holders.into_iter().filter(|other| other.id != user.id) {
        log::info!(
            "Releasing unverified email of user {} claimed by user {}",
            other.id,
            user.id
        );
        other.email = None;
        other.email_verified = false;
        other.email_verified_at = None;
        users.save_user(&other).await?;
    }

    if user
        .pending_email
        .as_deref()
        .is_some_and(|pending| same_address(pending, email))
    {
        user.pending_email = None;
    }
    user.email = Some(email.to_string());
    user.email_verified = true;
    user.email_verified_at = Some(now);
    Ok(())
}
