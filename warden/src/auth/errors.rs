//! Authentication error types.

use thiserror::Error;

/// Broad category of an authentication failure.
///
/// Transport layers map these onto their own status codes; nothing finer
/// grained than the category is meant to reach a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    BadRequest,
    NotFound,
    Internal,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JWT token error
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Missing, invalid or expired credential, session or account
    #[error("{0}")]
    Unauthorized(String),

    /// Malformed, expired or used token, duplicate claim, provider misuse
    #[error("{0}")]
    BadRequest(String),

    /// Referenced entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// Store-level uniqueness constraint rejected a write
    #[error("{0}")]
    Conflict(String),

    /// Identity provider or other upstream call failed
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl AuthError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AuthError::Unauthorized(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AuthError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AuthError::NotFound(message.into())
    }

    /// Classify the error into the public taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Unauthorized(_) | AuthError::JwtError(_) => ErrorKind::Unauthorized,
            AuthError::BadRequest(_) | AuthError::Conflict(_) => ErrorKind::BadRequest,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Database(_) | AuthError::HashingFailed | AuthError::Upstream(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database, hashing and JWT errors are sanitized to prevent information
    /// disclosure about the internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::HashingFailed => {
                "Internal server error".to_string()
            }
            AuthError::JwtError(_) => "Authentication failed".to_string(),
            AuthError::Upstream(_) => "Identity provider unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(AuthError::unauthorized("x").kind(), ErrorKind::Unauthorized);
        assert_eq!(AuthError::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(
            AuthError::Conflict("dup".to_string()).kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(AuthError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(AuthError::HashingFailed.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_client_message_sanitizes_internals() {
        let err = AuthError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.client_message(), "Internal server error");

        let err = AuthError::Upstream("github returned 502 at /user".to_string());
        assert_eq!(err.client_message(), "Identity provider unavailable");

        let err = AuthError::bad_request("Reset token expired");
        assert_eq!(err.client_message(), "Reset token expired");
    }
}
