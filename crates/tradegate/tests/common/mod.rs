//! Test utilities and common setup.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response},
};
use serde_json::Value;
use tower::ServiceExt;
use tradegate::api::{AppState, create_router};
use tradegate::auth::{Claims, TokenVerifier};
use tradegate::config::AppConfig;
use wiremock::MockServer;

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";
const FORGER_SECRET: &str = "someone-else-entirely-with-a-32-char-plus-secret";

/// Router wired to a mock trading backend.
pub struct TestApp {
    pub router: Router,
    pub upstream: MockServer,
    pub verifier: TokenVerifier,
}

/// Create a test config with a JWT secret and the given upstream.
pub fn test_config(upstream_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(TEST_SECRET.to_string());
    config.upstream.base_url = Some(upstream_url.to_string());
    config
}

/// Create a test application in the development tier.
pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

/// Create a test application after adjusting the config.
pub async fn test_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let upstream = MockServer::start().await;
    let mut config = test_config(&upstream.uri());
    configure(&mut config);

    let state = AppState::from_config(&config).unwrap();
    let verifier = state.verifier.clone();
    TestApp {
        router: create_router(state),
        upstream,
        verifier,
    }
}

impl TestApp {
    pub fn valid_token(&self, sub: &str) -> String {
        self.verifier
            .mint(sub, std::time::Duration::from_secs(3600))
            .unwrap()
    }

    pub fn expired_token(&self, sub: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        self.verifier
            .sign(&Claims::new(sub, now - 7200, now - 3600))
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// A well-formed token signed with a different secret.
pub fn forged_token(sub: &str) -> String {
    TokenVerifier::new(Some(FORGER_SECRET), 0)
        .mint(sub, std::time::Duration::from_secs(3600))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn authed(method: Method, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Port with nothing listening on it.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
