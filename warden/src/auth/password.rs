//! Argon2id password hashing with a server-side pepper.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};

use super::errors::{AuthError, AuthResult};

/// Maximum accepted password length, bounding hashing cost
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Password hasher holding the server pepper
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
}

impl PasswordHasher {
    pub fn new(pepper: String) -> Self {
        Self { pepper }
    }

    /// Hash password with Argon2id + pepper
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(Argon2::default()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Verify password against hash
    pub fn verify(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash =
            PasswordHash::new(hash).map_err(|_| AuthError::unauthorized("Invalid credentials"))?;

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::unauthorized("Invalid credentials"))
    }

    /// Spend the cost of a real verification and fail.
    ///
    /// Used when there is no stored hash to check against, so a missing
    /// account takes as long to reject as a wrong password.
    pub fn reject(&self, password: &str) -> AuthResult<()> {
        let _ = self.hash(password);
        Err(AuthError::unauthorized("Invalid credentials"))
    }
}

/// Reject empty or oversized passwords
pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.is_empty() {
        return Err(AuthError::bad_request("Password must not be empty"));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::bad_request(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new("pepper-0123456789".to_string());
        let hash = hasher.hash("x").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("x", &hash).is_ok());
        assert!(hasher.verify("y", &hash).is_err());
    }

    #[test]
    fn test_reject_always_fails() {
        let hasher = PasswordHasher::new("pepper-0123456789".to_string());
        let err = hasher.reject("x").unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(ref m) if m == "Invalid credentials"));
    }

    #[test]
    fn test_pepper_is_part_of_the_hash() {
        let hash = PasswordHasher::new("pepper-a".to_string()).hash("secret").unwrap();
        let other = PasswordHasher::new("pepper-b".to_string());
        assert!(other.verify("secret", &hash).is_err());
    }

    #[test]
    fn test_validate_password_bounds() {
        assert!(validate_password("").is_err());
        assert!(validate_password("x").is_ok());
        assert!(validate_password(&"a".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
    }
}
