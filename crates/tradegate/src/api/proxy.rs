//! Resource proxy.
//!
//! One handler serves every configured resource. Per call:
//! `received -> authenticated? -> (forward -> relay | map error) | reject`.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Extension, Request, State},
    http::Method,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::auth::{Credential, Rejection};
use crate::upstream::{ProxyRequest, UpstreamResponse};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Largest request body accepted for pass-through.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Resource served by a route, attached as a request extension.
#[derive(Debug, Clone)]
pub struct ResourceRoute {
    name: Arc<str>,
}

impl ResourceRoute {
    pub fn new(name: &str) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upstream path for an inbound `/api/<name>[/...]` path.
    ///
    /// Rejects dot segments so a caller cannot climb out of the resource.
    pub fn upstream_path(&self, inbound_path: &str) -> ApiResult<String> {
        let prefix = format!("/api/{}", self.name);
        let rest = inbound_path
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| ApiError::not_found("Unknown resource"))?;

        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(ApiError::not_found("Unknown resource"));
        }

        let escapes = rest.split('/').any(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            decoded == "." || decoded == ".."
        });
        if escapes {
            return Err(ApiError::bad_request("Invalid resource path"));
        }

        Ok(format!("{}{}", self.name, rest.trim_end_matches('/')))
    }
}

/// Proxy a resource request to the trading backend.
#[instrument(skip_all, fields(resource = %route.name(), method = %req.method()))]
pub async fn proxy_resource(
    State(state): State<AppState>,
    Extension(route): Extension<ResourceRoute>,
    req: Request,
) -> ApiResult<Response> {
    let (parts, body) = req.into_parts();
    let upstream_path = route.upstream_path(parts.uri.path())?;

    // The gate only checked presence; verify signature and expiry here.
    let credential = Credential::from_headers(&parts.headers, state.cookie_name())
        .ok_or(ApiError::from(Rejection::Missing))?;
    let claims = state.verifier.verify(&credential.token).into_result()?;

    let body = read_json_body(&parts.method, body).await?;

    debug!(user = %claims.sub, path = %upstream_path, "proxying request");

    let request = ProxyRequest::new(parts.method.clone(), upstream_path)
        .with_query(parts.uri.query())
        .with_bearer(credential.token)
        .with_body(body);

    let response = state.upstream.send(request).await?;
    Ok(relay(response))
}

/// Parse the JSON body of a mutating request.
///
/// GET, HEAD and empty bodies yield `None`.
pub async fn read_json_body(method: &Method, body: Body) -> ApiResult<Option<Value>> {
    if matches!(*method, Method::GET | Method::HEAD) {
        return Ok(None);
    }

    read_json(body).await
}

/// Buffer a body up to [`MAX_BODY_BYTES`] and parse it as JSON.
pub async fn read_json(body: Body) -> ApiResult<Option<Value>> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("Request body is too large or unreadable"))?;

    parse_json_bytes(&bytes)
}

pub fn parse_json_bytes(bytes: &[u8]) -> ApiResult<Option<Value>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| ApiError::bad_request(format!("Malformed JSON body: {e}")))
}

/// Relay an upstream success unchanged.
pub fn relay(response: UpstreamResponse) -> Response {
    match response.body {
        Some(body) => (response.status, Json(body)).into_response(),
        None => response.status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_upstream_path() {
        let route = ResourceRoute::new("bots");
        assert_eq!(route.upstream_path("/api/bots").unwrap(), "bots");
        assert_eq!(route.upstream_path("/api/bots/").unwrap(), "bots");
        assert_eq!(route.upstream_path("/api/bots/7").unwrap(), "bots/7");
        assert_eq!(
            route.upstream_path("/api/bots/7/start").unwrap(),
            "bots/7/start"
        );
    }

    #[test]
    fn test_upstream_path_rejects_traversal() {
        let route = ResourceRoute::new("bots");
        for path in ["/api/bots/../users", "/api/bots/%2e%2e/users", "/api/bots/./7"] {
            assert_eq!(
                route.upstream_path(path).unwrap_err().status_code(),
                StatusCode::BAD_REQUEST,
                "{path}"
            );
        }
    }

    #[test]
    fn test_upstream_path_other_resource() {
        let route = ResourceRoute::new("bots");
        assert_eq!(
            route.upstream_path("/api/botsx").unwrap_err().status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_parse_json_bytes() {
        assert_eq!(parse_json_bytes(b"").unwrap(), None);
        assert_eq!(parse_json_bytes(b"  \n").unwrap(), None);
        assert_eq!(
            parse_json_bytes(br#"{"qty": 2}"#).unwrap(),
            Some(json!({"qty": 2}))
        );
        assert_eq!(
            parse_json_bytes(b"{qty: 2").unwrap_err().status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_read_json_body_ignores_get_body() {
        let body = read_json_body(&Method::GET, Body::from("not json"))
            .await
            .unwrap();
        assert_eq!(body, None);

        let body = read_json_body(&Method::PATCH, Body::from(r#"{"active":false}"#))
            .await
            .unwrap();
        assert_eq!(body, Some(json!({"active": false})));
    }

    #[tokio::test]
    async fn test_read_json_rejects_oversized_body() {
        let oversized = vec![b' '; MAX_BODY_BYTES + 1];
        let err = read_json(Body::from(oversized)).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_relay_preserves_status_and_body() {
        let response = relay(UpstreamResponse {
            status: StatusCode::CREATED,
            body: Some(json!({"id": 1})),
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({"id": 1}));

        let empty = relay(UpstreamResponse {
            status: StatusCode::NO_CONTENT,
            body: None,
        });
        assert_eq!(empty.status(), StatusCode::NO_CONTENT);
    }
}
