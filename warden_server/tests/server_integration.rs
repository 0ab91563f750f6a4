//! Integration tests for the HTTP surface, run against the in-memory store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt; // For `oneshot` method
use url::Url;
use warden::auth::Provider;
use warden::db::InMemoryStore;
use warden::identity::{IdentityProvider, ProviderError, ProviderProfile, ProviderRegistry};
use warden::mail::{MemoryMailQueue, extract_token};
use warden::risk::DisabledLocator;
use warden::{Stores, Warden, WardenConfig};
use warden_server::api::{AppState, create_router};

const FRONTEND: &str = "https://app.test";
/// Reverse proxy every test request arrives through
const PROXY: &str = "10.0.0.1:40000";

struct FakeGithub;

#[async_trait]
impl IdentityProvider for FakeGithub {
    fn kind(&self) -> Provider {
        Provider::Github
    }

    fn authorization_url(&self, state: &str) -> Result<Url, ProviderError> {
        Ok(Url::parse_with_params(
            "https://github.test/login/oauth/authorize",
            &[("state", state)],
        )?)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ProviderError> {
        if code == "good-code" {
            Ok("gh-access".to_string())
        } else {
            Err(ProviderError::Rejected("bad_verification_code".to_string()))
        }
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<ProviderProfile, ProviderError> {
        Ok(ProviderProfile {
            provider_id: "4242".to_string(),
            email: Some("octo@example.com".to_string()),
            name: "Octo Cat".to_string(),
        })
    }
}

struct TestServer {
    app: Router,
    mail: Arc<MemoryMailQueue>,
}

fn create_test_server() -> TestServer {
    let store = Arc::new(InMemoryStore::new());
    let mail = Arc::new(MemoryMailQueue::new());
    let mut config = WardenConfig::new(
        "test-access-secret-0123456789abcdef".to_string(),
        "test-refresh-secret-0123456789abcdef".to_string(),
        "test-pepper-0123456789".to_string(),
    );
    config.frontend_url = FRONTEND.to_string();

    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(FakeGithub));

    let warden = Warden::new(
        &config,
        Stores::memory(store),
        Arc::new(DisabledLocator),
        mail.clone(),
        providers,
    );
    let proxy: SocketAddr = PROXY.parse().unwrap();
    let state = AppState::new(warden, None, FRONTEND.to_string(), false)
        .with_trusted_proxies(vec![proxy.ip()]);
    let app = create_router(state);
    TestServer { app, mail }
}

/// Cookies set by a response, by name
fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn raw_set_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|raw| raw.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

fn cookie_header(jar: &HashMap<String, String>) -> String {
    jar.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn json_body(response: Response<Body>) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

impl TestServer {
    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn post_json(&self, uri: &str, body: Value, jar: Option<&HashMap<String, String>>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("user-agent", "Firefox")
            .header("x-forwarded-for", "203.0.113.9")
            .extension(ConnectInfo(PROXY.parse::<SocketAddr>().unwrap()));
        if let Some(jar) = jar {
            builder = builder.header(header::COOKIE, cookie_header(jar));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Log in over a direct connection from `peer`
    async fn login_from(&self, username: &str, peer: &str, forwarded_for: &str) -> Response<Body> {
        let body = json!({ "identifier": username, "password": "TestPass123!" });
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .header("content-type", "application/json")
            .header("user-agent", "curl/8")
            .header("x-forwarded-for", forwarded_for)
            .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, uri: &str, jar: &HashMap<String, String>) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie_header(jar))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn register(&self, username: &str, email: Option<&str>) -> Response<Body> {
        self.post_json(
            "/api/v1/auth/register",
            json!({ "username": username, "password": "TestPass123!", "email": email }),
            None,
        )
        .await
    }

    /// Register then log in, returning the cookie jar
    async fn signed_in(&self, username: &str) -> HashMap<String, String> {
        assert_eq!(self.register(username, None).await.status(), StatusCode::CREATED);
        let response = self
            .post_json(
                "/api/v1/auth/login",
                json!({ "identifier": username, "password": "TestPass123!" }),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        set_cookies(&response)
    }
}

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let server = create_test_server();

    let response = server
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["kind"], "memory");
    assert_eq!(body["providers"], json!(["github"]));
}

// ============================================================================
// Authentication Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_register_sets_credentials_without_session() {
    let server = create_test_server();

    let response = server.register("ann", Some("Ann@Example.com")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookies = set_cookies(&response);
    assert!(cookies.contains_key("accessToken"));
    assert!(cookies.contains_key("refreshToken"));
    assert!(!cookies.contains_key("sessionId"));

    let raw = raw_set_cookie(&response, "accessToken").unwrap();
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("SameSite=Strict"));
    assert!(raw.contains("Path=/"));

    let body = json_body(response).await;
    assert_eq!(body["user"]["username"], "ann");
    assert_eq!(body["user"]["email"], "ann@example.com");
    assert!(body["session_id"].is_null());
    assert!(body["user"].get("password_hash").is_none());

    // A verification mail goes out for the new address
    assert_eq!(server.mail.messages_to("ann@example.com").len(), 1);
}

#[tokio::test]
async fn test_register_duplicate_username() {
    let server = create_test_server();
    server.register("ann", None).await;

    let response = server.register("ann", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Username already taken");
}

#[tokio::test]
async fn test_login_and_me() {
    let server = create_test_server();
    let jar = server.signed_in("ann").await;
    assert!(jar.contains_key("sessionId"));

    let response = server.request("GET", "/api/v1/auth/me", &jar).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "ann");
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn test_invalid_login_returns_error() {
    let server = create_test_server();
    server.register("ann", None).await;

    let response = server
        .post_json(
            "/api/v1/auth/login",
            json!({ "username": "ann", "password": "wrong" }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_protected_route_requires_session() {
    let server = create_test_server();

    let response = server.request("GET", "/api/v1/auth/me", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Session required");

    // Registration credentials alone carry no session
    let registered = set_cookies(&server.register("bob", None).await);
    let response = server.request("GET", "/api/v1/auth/me", &registered).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Session required");
}

#[tokio::test]
async fn test_bearer_and_session_header_for_non_browser_clients() {
    let server = create_test_server();
    let jar = server.signed_in("ann").await;

    let request = Request::builder()
        .uri("/api/v1/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", jar["accessToken"]))
        .header("x-session-id", jar["sessionId"].clone())
        .body(Body::empty())
        .unwrap();
    assert_eq!(server.send(request).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rotates_and_rejects_replay() {
    let server = create_test_server();
    let jar = server.signed_in("ann").await;

    let response = server.post_json("/api/v1/auth/refresh", json!({}), Some(&jar)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = set_cookies(&response);
    assert_ne!(rotated["refreshToken"], jar["refreshToken"]);
    assert_ne!(rotated["accessToken"], jar["accessToken"]);
    assert_eq!(json_body(response).await["session_id"], jar["sessionId"].as_str());

    // Replaying the old refresh credential fails
    let response = server.post_json("/api/v1/auth/refresh", json!({}), Some(&jar)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_without_cookies() {
    let server = create_test_server();

    let response = server.post_json("/api/v1/auth/refresh", json!({}), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Session required");
}

#[tokio::test]
async fn test_logout_clears_cookies_and_revokes_session() {
    let server = create_test_server();
    let jar = server.signed_in("ann").await;

    let response = server.post_json("/api/v1/auth/logout", json!({}), Some(&jar)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    for name in ["accessToken", "refreshToken", "sessionId"] {
        let raw = raw_set_cookie(&response, name).unwrap();
        assert!(raw.starts_with(&format!("{name}=;")), "{raw}");
        assert!(raw.contains("Max-Age=0"));
        assert!(raw.contains("1970"));
    }

    let response = server.request("GET", "/api/v1/auth/me", &jar).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Session revoked");
}

#[tokio::test]
async fn test_sessions_list_and_revoke() {
    let server = create_test_server();
    let ann = server.signed_in("ann").await;
    let bob = server.signed_in("bob").await;

    let response = server.request("GET", "/api/v1/auth/sessions", &ann).await;
    assert_eq!(response.status(), StatusCode::OK);
    let sessions = json_body(response).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["ip_address"], "203.0.113.9");
    assert_eq!(sessions[0]["user_agent"], "Firefox");

    // Someone else's session looks like a missing one
    let uri = format!("/api/v1/auth/sessions/{}", bob["sessionId"]);
    let response = server.request("DELETE", &uri, &ann).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let uri = format!("/api/v1/auth/sessions/{}", ann["sessionId"]);
    let response = server.request("DELETE", &uri, &ann).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = server.request("GET", "/api/v1/auth/me", &ann).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server.request("POST", "/api/v1/auth/logout-all", &bob).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["revoked"], 1);
}

#[tokio::test]
async fn test_account_lookup_by_id() {
    let server = create_test_server();
    let ann = server.signed_in("ann").await;
    server.signed_in("bob").await;

    let response = server.request("GET", "/api/v1/auth/me", &ann).await;
    let id = json_body(response).await["id"].clone();

    let response = server
        .request("GET", &format!("/api/v1/auth/users/{id}"), &ann)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], "ann");

    // bob's account is hidden from ann
    let other = id.as_i64().unwrap() + 1;
    let response = server
        .request("GET", &format!("/api/v1/auth/users/{other}"), &ann)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forwarded_for_ignored_from_untrusted_peer() {
    let server = create_test_server();
    server.signed_in("ann").await;

    let response = server
        .login_from("ann", "203.0.113.50:51000", "198.51.100.1")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let jar = set_cookies(&response);

    let response = server.request("GET", "/api/v1/auth/sessions", &jar).await;
    let sessions = json_body(response).await;
    let ips: Vec<&str> = sessions
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["ip_address"].as_str())
        .collect();
    assert!(ips.contains(&"203.0.113.50"), "{ips:?}");
    assert!(!ips.contains(&"198.51.100.1"), "{ips:?}");
}

#[tokio::test]
async fn test_unparsable_forwarded_for_falls_back_to_peer() {
    let server = create_test_server();
    server.signed_in("ann").await;

    let response = server.login_from("ann", PROXY, &"x".repeat(300)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let jar = set_cookies(&response);

    let response = server.request("GET", "/api/v1/auth/sessions", &jar).await;
    let sessions = json_body(response).await;
    for session in sessions.as_array().unwrap() {
        let ip = session["ip_address"].as_str().unwrap();
        assert!(ip.len() <= 45, "{ip}");
    }
    assert!(
        sessions
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s["ip_address"] == "10.0.0.1")
    );
}

// ============================================================================
// Verification and Reset Tests
// ============================================================================

#[tokio::test]
async fn test_verify_email_link() {
    let server = create_test_server();
    server.register("ann", Some("ann@example.com")).await;

    let message = server.mail.messages_to("ann@example.com").pop().unwrap();
    assert!(message.html.contains("https://app.test/verify-email?token="));
    let token = extract_token(&message.html).unwrap();

    let uri = format!("/api/v1/auth/verify-email?token={token}");
    let response = server.request("GET", &uri, &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"]["email_verified"], true);

    let response = server
        .request("GET", "/api/v1/auth/verify-email?token=nope", &HashMap::new())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid verification token");
}

#[tokio::test]
async fn test_send_verification_requires_email() {
    let server = create_test_server();
    let jar = server.signed_in("ann").await;

    let response = server.request("POST", "/api/v1/auth/send-verification", &jar).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No email address on account");

    let response = server
        .post_json("/api/v1/auth/change-email", json!({ "email": "ann@example.com" }), Some(&jar))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.mail.messages_to("ann@example.com").len(), 1);
}

#[tokio::test]
async fn test_password_reset_does_not_reveal_accounts() {
    let server = create_test_server();
    server.register("ann", Some("ann@example.com")).await;

    let known = server
        .post_json("/api/v1/auth/request-password-reset", json!({ "email": "ann@example.com" }), None)
        .await;
    let unknown = server
        .post_json("/api/v1/auth/request-password-reset", json!({ "email": "ghost@example.com" }), None)
        .await;
    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(json_body(known).await, json_body(unknown).await);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let server = create_test_server();
    let jar = server.signed_in("ann").await;
    server
        .post_json("/api/v1/auth/change-email", json!({ "email": "ann@example.com" }), Some(&jar))
        .await;
    let verify = server.mail.messages_to("ann@example.com").pop().unwrap();
    let token = extract_token(&verify.html).unwrap();
    server
        .request("GET", &format!("/api/v1/auth/verify-email?token={token}"), &HashMap::new())
        .await;

    server
        .post_json("/api/v1/auth/request-password-reset", json!({ "email": "ann@example.com" }), None)
        .await;
    let reset = server.mail.messages_to("ann@example.com").pop().unwrap();
    assert!(reset.html.contains("https://app.test/reset-password?token="));
    let token = extract_token(&reset.html).unwrap();

    let response = server
        .post_json("/api/v1/auth/reset-password", json!({ "token": token, "password": "NewPass456!" }), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Every session ended
    let response = server.request("GET", "/api/v1/auth/me", &jar).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = server
        .post_json("/api/v1/auth/login", json!({ "identifier": "ann@example.com", "password": "NewPass456!" }), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Provider Login Tests
// ============================================================================

#[tokio::test]
async fn test_provider_redirect_sets_state() {
    let server = create_test_server();

    let response = server.request("GET", "/api/v1/auth/github", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let state = set_cookies(&response)["oauthState"].clone();
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://github.test/login/oauth/authorize"));
    assert!(location.contains(&format!("state={state}")));

    let raw = raw_set_cookie(&response, "oauthState").unwrap();
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("SameSite=Lax"));
}

#[tokio::test]
async fn test_provider_callback_checks_state() {
    let server = create_test_server();

    let response = server
        .request("GET", "/api/v1/auth/github/callback?code=good-code&state=forged", &HashMap::new())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid OAuth state");

    let jar = HashMap::from([("oauthState".to_string(), "expected".to_string())]);
    let response = server
        .request("GET", "/api/v1/auth/github/callback?code=good-code&state=other", &jar)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_provider_callback_signs_in() {
    let server = create_test_server();

    let redirect = server.request("GET", "/api/v1/auth/github", &HashMap::new()).await;
    let jar = set_cookies(&redirect);
    let uri = format!(
        "/api/v1/auth/github/callback?code=good-code&state={}",
        jar["oauthState"]
    );

    let response = server.request("GET", &uri, &jar).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], FRONTEND);

    let session = set_cookies(&response);
    assert!(session.contains_key("sessionId"));
    assert_eq!(session["oauthState"], "");

    let response = server.request("GET", "/api/v1/auth/me", &session).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "octo_cat");
    assert_eq!(body["email_verified"], true);
    assert_eq!(body["github_linked"], true);
}

#[tokio::test]
async fn test_provider_errors() {
    let server = create_test_server();

    let response = server.request("GET", "/api/v1/auth/myspace", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server.request("GET", "/api/v1/auth/google", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Provider google is not configured");

    let redirect = server.request("GET", "/api/v1/auth/github", &HashMap::new()).await;
    let jar = set_cookies(&redirect);
    let uri = format!(
        "/api/v1/auth/github/callback?code=bad-code&state={}",
        jar["oauthState"]
    );
    let response = server.request("GET", &uri, &jar).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Identity provider unavailable");
}
