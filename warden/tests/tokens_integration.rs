//! Integration tests for email verification and password reset tokens.

mod common;

use chrono::{Duration, Utc};
use common::{Harness, device};
use warden::auth::{AuthError, LoginRequest, NewUser, Role};
use warden::db::{TokenRepository, UserRepository};
use warden::tokens::{RESET_REQUESTED_MESSAGE, TokenPurpose};

fn bad_request(err: AuthError) -> String {
    match err {
        AuthError::BadRequest(message) => message,
        other => panic!("expected BadRequest, got {other:?}"),
    }
}

#[tokio::test]
async fn test_verify_twice_is_idempotent() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("ann@example.com")).await;

    h.warden.verification.send_verification(user_id).await.unwrap();
    let token = h.last_token_to("ann@example.com");

    let user = h.warden.verification.verify(&token).await.unwrap();
    assert!(user.email_verified);
    assert!(user.email_verified_at.is_some());

    let again = h.warden.verification.verify(&token).await.unwrap();
    assert!(again.email_verified);

    let stored = h
        .store
        .find_token(&token, TokenPurpose::EmailVerification)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.used_at.is_some());
}

#[tokio::test]
async fn test_used_token_fails_when_user_not_verified() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("ann@example.com")).await;
    h.warden.verification.send_verification(user_id).await.unwrap();
    let token = h.last_token_to("ann@example.com");
    h.warden.verification.verify(&token).await.unwrap();

    let mut user = h.store.find_by_id(user_id).await.unwrap().unwrap();
    user.email_verified = false;
    h.store.save_user(&user).await.unwrap();

    let err = h.warden.verification.verify(&token).await.unwrap_err();
    assert_eq!(bad_request(err), "Verification token already used");
}

#[tokio::test]
async fn test_send_verification_preconditions() {
    let h = Harness::new();
    let no_email = h.register("ann", "x", None).await;

    let err = h.warden.verification.send_verification(no_email).await.unwrap_err();
    assert_eq!(bad_request(err), "No email address on account");

    let err = h.warden.verification.send_verification(999).await.unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));

    let bob = h.register("bob", "y", Some("bob@example.com")).await;
    h.warden.verification.send_verification(bob).await.unwrap();
    let token = h.last_token_to("bob@example.com");
    h.warden.verification.verify(&token).await.unwrap();

    let err = h.warden.verification.send_verification(bob).await.unwrap_err();
    assert_eq!(bad_request(err), "Email already verified");
}

#[tokio::test]
async fn test_new_verification_token_replaces_old_one() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("ann@example.com")).await;

    h.warden.verification.send_verification(user_id).await.unwrap();
    let first = h.last_token_to("ann@example.com");
    h.warden.verification.send_verification(user_id).await.unwrap();
    let second = h.last_token_to("ann@example.com");
    assert_ne!(first, second);

    let err = h.warden.verification.verify(&first).await.unwrap_err();
    assert_eq!(bad_request(err), "Invalid verification token");
    h.warden.verification.verify(&second).await.unwrap();
}

#[tokio::test]
async fn test_expired_and_unknown_verification_tokens() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("ann@example.com")).await;
    h.warden.verification.send_verification(user_id).await.unwrap();
    let token = h.last_token_to("ann@example.com");

    h.store
        .set_token_expiry(&token, Utc::now() - Duration::minutes(1))
        .await;
    let err = h.warden.verification.verify(&token).await.unwrap_err();
    assert_eq!(bad_request(err), "Verification token expired");

    let err = h.warden.verification.verify("deadbeef").await.unwrap_err();
    assert_eq!(bad_request(err), "Invalid verification token");
}

#[tokio::test]
async fn test_first_verifier_wins_shared_email() {
    let h = Harness::new();
    let ann = h.register("ann", "x", Some("shared@example.com")).await;
    let bob = h.register("bob", "y", Some("shared@example.com")).await;

    h.warden.verification.send_verification(ann).await.unwrap();
    let ann_token = h.last_token_to("shared@example.com");
    h.warden.verification.send_verification(bob).await.unwrap();
    let bob_token = h.last_token_to("shared@example.com");

    h.warden.verification.verify(&bob_token).await.unwrap();

    let ann_user = h.store.find_by_id(ann).await.unwrap().unwrap();
    assert!(ann_user.email.is_none());

    let err = h.warden.verification.verify(&ann_token).await.unwrap_err();
    assert_eq!(bad_request(err), "Email has changed since this token was issued");
}

#[tokio::test]
async fn test_verified_holder_blocks_claim() {
    let h = Harness::new();
    let ann = h.register("ann", "x", Some("shared@example.com")).await;
    h.warden.verification.send_verification(ann).await.unwrap();
    let token = h.last_token_to("shared@example.com");

    // Someone else verified the address through another path meanwhile
    h.store
        .create_user(NewUser {
            username: "carol".to_string(),
            password_hash: None,
            email: Some("shared@example.com".to_string()),
            email_verified: true,
            provider: None,
            role: Role::User,
        })
        .await
        .unwrap();

    let err = h.warden.verification.verify(&token).await.unwrap_err();
    assert_eq!(bad_request(err), "Email already verified by another user");
    let ann_user = h.store.find_by_id(ann).await.unwrap().unwrap();
    assert!(!ann_user.email_verified);
}

#[tokio::test]
async fn test_email_change_promotes_pending_address() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("old@example.com")).await;

    h.warden
        .verification
        .request_email_change(user_id, "New@Example.com")
        .await
        .unwrap();
    let user = h.store.find_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.email.as_deref(), Some("old@example.com"));
    assert_eq!(user.pending_email.as_deref(), Some("new@example.com"));

    let token = h.last_token_to("new@example.com");
    let user = h.warden.verification.verify(&token).await.unwrap();
    assert_eq!(user.email.as_deref(), Some("new@example.com"));
    assert!(user.pending_email.is_none());
    assert!(user.email_verified);

    let err = h
        .warden
        .verification
        .request_email_change(user_id, "not-an-email")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::BadRequest(_)));
}

#[tokio::test]
async fn test_reset_request_does_not_reveal_accounts() {
    let h = Harness::new();
    h.register("ann", "x", Some("ann@example.com")).await;

    let known = h.warden.reset.request("ANN@example.com").await.unwrap();
    let unknown = h.warden.reset.request("nobody@example.com").await.unwrap();
    assert_eq!(known, unknown);
    assert_eq!(known, RESET_REQUESTED_MESSAGE);

    assert_eq!(h.mail.messages_to("ann@example.com").len(), 1);
    assert!(h.mail.messages_to("nobody@example.com").is_empty());
}

#[tokio::test]
async fn test_reset_request_survives_mail_failure() {
    let h = Harness::new();
    h.register("ann", "x", Some("ann@example.com")).await;
    h.mail.close();

    let message = h.warden.reset.request("ann@example.com").await.unwrap();
    assert_eq!(message, RESET_REQUESTED_MESSAGE);
}

#[tokio::test]
async fn test_reset_ignores_accounts_without_password() {
    let h = Harness::new();
    let user = h
        .store
        .create_user(NewUser {
            username: "octo".to_string(),
            password_hash: None,
            email: Some("octo@example.com".to_string()),
            email_verified: true,
            provider: None,
            role: Role::User,
        })
        .await
        .unwrap();

    let message = h.warden.reset.request("octo@example.com").await.unwrap();
    assert_eq!(message, RESET_REQUESTED_MESSAGE);
    assert!(h.mail.messages_to("octo@example.com").is_empty());
    assert!(
        h.store
            .tokens_for(user.id, TokenPurpose::PasswordReset)
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_send_verification_with_closed_queue_keeps_token() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("ann@example.com")).await;
    h.mail.close();

    h.warden.verification.send_verification(user_id).await.unwrap();

    let tokens = h
        .store
        .tokens_for(user_id, TokenPurpose::EmailVerification)
        .await;
    assert_eq!(tokens.len(), 1);
    let user = h.warden.verification.verify(&tokens[0].token).await.unwrap();
    assert!(user.email_verified);
}

#[tokio::test]
async fn test_reset_changes_password_and_revokes_sessions() {
    let h = Harness::new();
    let user_id = h.register("ann", "old", Some("ann@example.com")).await;
    let credentials = h.login("ann", "old", &device("Firefox", "10.0.0.1")).await;

    h.warden.reset.request("ann@example.com").await.unwrap();
    let token = h.last_token_to("ann@example.com");
    h.warden.reset.reset(&token, "new").await.unwrap();

    let err = h
        .warden
        .validator
        .validate(Some(&credentials.access_token), credentials.session_id.as_deref())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(ref m) if m == "Session revoked"));
    assert!(
        h.store
            .all_sessions_for(user_id)
            .await
            .iter()
            .all(|s| !s.is_valid)
    );

    h.login("ann", "new", &device("Firefox", "10.0.0.1")).await;
    let err = h
        .warden
        .auth
        .login(
            LoginRequest {
                identifier: "ann".to_string(),
                password: "old".to_string(),
            },
            &device("Firefox", "10.0.0.1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized(_)));

    let err = h.warden.reset.reset(&token, "again").await.unwrap_err();
    assert_eq!(bad_request(err), "Reset token already used");
}

#[tokio::test]
async fn test_expired_reset_token_leaves_password_untouched() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("ann@example.com")).await;
    let before = h.store.find_by_id(user_id).await.unwrap().unwrap().password_hash;

    h.warden.reset.request("ann@example.com").await.unwrap();
    let token = h.last_token_to("ann@example.com");
    h.store
        .set_token_expiry(&token, Utc::now() - Duration::minutes(1))
        .await;

    let err = h.warden.reset.reset(&token, "new").await.unwrap_err();
    assert_eq!(bad_request(err), "Reset token expired");

    let after = h.store.find_by_id(user_id).await.unwrap().unwrap().password_hash;
    assert_eq!(before, after);
    h.login("ann", "x", &device("Firefox", "10.0.0.1")).await;

    let err = h.warden.reset.reset("unknown", "new").await.unwrap_err();
    assert_eq!(bad_request(err), "Invalid reset token");
}

#[tokio::test]
async fn test_reset_token_lifetime_is_one_hour() {
    let h = Harness::new();
    let user_id = h.register("ann", "x", Some("ann@example.com")).await;
    h.warden.reset.request("ann@example.com").await.unwrap();
    let token = h.last_token_to("ann@example.com");

    let stored = h
        .store
        .find_token(&token, TokenPurpose::PasswordReset)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_id, user_id);
    assert_eq!(stored.expires_at - stored.created_at, Duration::hours(1));
}
