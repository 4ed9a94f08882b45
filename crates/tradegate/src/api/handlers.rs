//! HTTP handlers outside the resource proxy.

use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::auth::{Claims, Credential, Rejection};
use crate::upstream::ProxyRequest;

use super::error::{ApiError, ApiResult};
use super::proxy::{read_json, relay};
use super::state::AppState;

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.to_string(),
    })
}

// ============================================================================
// Auth relay
// ============================================================================

/// Relay a login to the backend and store the returned token in the session cookie.
#[instrument(skip_all)]
pub async fn login(State(state): State<AppState>, body: Body) -> ApiResult<Response> {
    let body = read_json(body).await?
        .ok_or_else(|| ApiError::bad_request("Login request body is required"))?;

    let upstream = state
        .upstream
        .send(ProxyRequest::new(Method::POST, "auth/login").with_body(Some(body)))
        .await?;

    let token = upstream.body.as_ref().and_then(token_from_login_body);
    let mut response = relay(upstream);
    match token {
        Some(token) => {
            let cookie = state.cookie.session_cookie(&token);
            let value: HeaderValue = cookie
                .parse()
                .map_err(|_| ApiError::internal("token is not a valid cookie value"))?;
            response.headers_mut().append(SET_COOKIE, value);
            info!("login succeeded");
        }
        None => warn!("login response carried no token; cookie not set"),
    }

    Ok(response)
}

/// Relay a registration to the backend unchanged.
#[instrument(skip_all)]
pub async fn register(State(state): State<AppState>, body: Body) -> ApiResult<Response> {
    let body = read_json(body).await?
        .ok_or_else(|| ApiError::bad_request("Registration request body is required"))?;

    let upstream = state
        .upstream
        .send(ProxyRequest::new(Method::POST, "auth/register").with_body(Some(body)))
        .await?;

    Ok(relay(upstream))
}

/// Clear the session cookie.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, state.cookie.cleared_cookie())]),
        StatusCode::NO_CONTENT,
    )
}

/// Public view of the current session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: SessionUser,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl SessionResponse {
    fn from_claims(claims: Claims, now: i64) -> Self {
        Self {
            authenticated: true,
            expires_in: claims.seconds_remaining(now),
            user: SessionUser {
                id: claims.sub.clone(),
                name: claims.display_name().to_string(),
                email: claims.email,
                role: claims.role,
            },
        }
    }
}

/// Describe the caller's session, fully verifying the token.
pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    let credential = Credential::from_headers(&headers, state.cookie_name())
        .ok_or(ApiError::from(Rejection::Missing))?;
    let claims = state.verifier.verify(&credential.token).into_result()?;

    Ok(Json(SessionResponse::from_claims(
        claims,
        chrono::Utc::now().timestamp(),
    )))
}

/// Pull the session token out of a login response.
///
/// Accepts `token`, `access_token`, or either nested under `data`.
fn token_from_login_body(body: &Value) -> Option<String> {
    let find = |v: &Value| {
        ["token", "access_token"]
            .iter()
            .find_map(|key| v.get(key).and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };
    find(body).or_else(|| body.get("data").and_then(find))
}

// ============================================================================
// Development support
// ============================================================================

/// Request to mint a test token.
#[derive(Debug, Deserialize)]
pub struct TestTokenRequest {
    pub sub: String,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestTokenResponse {
    pub token: String,
    pub expires_in: u64,
}

const DEFAULT_TEST_TOKEN_TTL_SECS: u64 = 3600;

/// Mint a token signed with the configured secret. Development only.
pub async fn mint_test_token(
    State(state): State<AppState>,
    body: Body,
) -> ApiResult<Json<TestTokenResponse>> {
    if !state.environment.is_development() {
        return Err(ApiError::forbidden(
            "Test tokens are only available in development mode",
        ));
    }

    let body = read_json(body).await?
        .ok_or_else(|| ApiError::bad_request("Request body is required"))?;
    let request: TestTokenRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid test token request: {e}")))?;
    if request.sub.trim().is_empty() {
        return Err(ApiError::bad_request("sub must not be empty"));
    }

    let ttl = request.ttl_secs.unwrap_or(DEFAULT_TEST_TOKEN_TTL_SECS);
    let token = state
        .verifier
        .mint(&request.sub, Duration::from_secs(ttl))?;

    info!(sub = %request.sub, ttl, "minted test token");
    Ok(Json(TestTokenResponse {
        token,
        expires_in: ttl,
    }))
}

/// Fallback for unknown routes that got past the gate.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

/// Fallback for known routes hit with an unsupported method.
pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::bad_request(format!("Method {method} is not supported on {}", uri.path()))
}
