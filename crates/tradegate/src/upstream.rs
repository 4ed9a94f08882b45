//! Client for the trading backend.
//!
//! The underlying `reqwest::Client` is shared and never mutated; the caller's
//! bearer token travels with each [`ProxyRequest`].

use std::time::Duration;

use axum::http::{Method, StatusCode, header::ACCEPT};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// One outbound call, built per inbound request and dropped afterwards.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path below the API version, e.g. `bots/7`.
    pub path: String,
    pub query: Option<String>,
    pub bearer: Option<String>,
    pub body: Option<Value>,
    pub request_id: String,
}

impl ProxyRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            bearer: None,
            body: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.query = query.filter(|q| !q.is_empty()).map(str::to_string);
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }
}

/// Successful (2xx) upstream answer.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// `None` when the upstream sent an empty body.
    pub body: Option<Value>,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection refused, DNS failure, timeout.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream answered with a 4xx/5xx.
    #[error("upstream returned {status}: {message}")]
    Rejected { status: StatusCode, message: String },

    /// Body was not JSON, or the status made no sense.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// The outbound request could not be built.
    #[error("failed to build upstream request: {0}")]
    Request(String),
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl UpstreamClient {
    pub fn new(
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("tradegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.into().trim_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<base>/<version>/<path>[?query]`
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let path = path.trim_start_matches('/');
        let mut url = if self.api_version.is_empty() {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/{}/{}", self.base_url, self.api_version, path)
        };
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Perform exactly one upstream call. No retries.
    pub async fn send(&self, req: ProxyRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(&req.path, req.query.as_deref());
        debug!(
            request_id = %req.request_id,
            method = %req.method,
            %url,
            "forwarding to upstream"
        );

        let mut builder = self
            .client
            .request(req.method.clone(), &url)
            .header(ACCEPT, "application/json")
            .header("x-request-id", req.request_id.as_str());
        if let Some(token) = req.bearer.as_deref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = req.body.as_ref() {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                UpstreamError::Request(e.to_string())
            } else {
                UpstreamError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        let body = parse_body(&bytes);

        debug!(request_id = %req.request_id, status = status.as_u16(), "upstream responded");

        if status.is_success() {
            return Ok(UpstreamResponse {
                status,
                body: body.map_err(UpstreamError::InvalidResponse)?,
            });
        }

        if !(status.is_client_error() || status.is_server_error()) {
            return Err(UpstreamError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }

        let message = match body {
            Ok(Some(value)) => error_message(&value),
            Ok(None) => None,
            Err(e) => return Err(UpstreamError::InvalidResponse(e)),
        }
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Upstream error")
                .to_string()
        });

        Err(UpstreamError::Rejected { status, message })
    }
}

fn parse_body(bytes: &[u8]) -> Result<Option<Value>, String> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// Pull a human-readable message out of an upstream error body.
fn error_message(body: &Value) -> Option<String> {
    ["error", "message", "detail"].iter().find_map(|key| match body.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        UpstreamClient::new(server.uri(), "v1", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_for() {
        let client =
            UpstreamClient::new("https://api.example/", "/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url_for("bots", None), "https://api.example/v1/bots");
        assert_eq!(
            client.url_for("/bots/7", Some("limit=5")),
            "https://api.example/v1/bots/7?limit=5"
        );
        assert_eq!(client.url_for("bots", Some("")), "https://api.example/v1/bots");

        let unversioned =
            UpstreamClient::new("https://api.example", "", Duration::from_secs(1)).unwrap();
        assert_eq!(unversioned.url_for("orders", None), "https://api.example/orders");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(&json!({"error": "Bot not found"})).as_deref(),
            Some("Bot not found")
        );
        assert_eq!(
            error_message(&json!({"message": "Plan expired"})).as_deref(),
            Some("Plan expired")
        );
        assert_eq!(
            error_message(&json!({"detail": "Not authenticated"})).as_deref(),
            Some("Not authenticated")
        );
        assert_eq!(
            error_message(&json!({"error": {"message": "nested"}})).as_deref(),
            Some("nested")
        );
        assert_eq!(error_message(&json!({"code": 12})), None);
    }

    #[tokio::test]
    async fn test_send_forwards_bearer_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/bots"))
            .and(header("authorization", "Bearer tok-123"))
            .and(body_json(json!({"name": "grid"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .send(
                ProxyRequest::new(Method::POST, "bots")
                    .with_bearer("tok-123")
                    .with_body(Some(json!({"name": "grid"}))),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body, Some(json!({"id": 9})));
    }

    #[tokio::test]
    async fn test_send_forwards_query() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/trade-logs"))
            .and(query_param("bot_id", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .send(ProxyRequest::new(Method::GET, "trade-logs").with_query(Some("bot_id=4")))
            .await
            .unwrap();
        assert_eq!(response.body, Some(json!([])));
    }

    #[tokio::test]
    async fn test_empty_success_body() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/bots/3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .send(ProxyRequest::new(Method::DELETE, "bots/3"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_rejected_uses_upstream_message_or_reason() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/bots/404"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "Bot not found"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/bots/empty"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = client_for(&server);
        match client.send(ProxyRequest::new(Method::GET, "bots/404")).await {
            Err(UpstreamError::Rejected { status, message }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "Bot not found");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        match client.send(ProxyRequest::new(Method::GET, "bots/empty")).await {
            Err(UpstreamError::Rejected { status, message }) => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(message, "Conflict");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_body_is_invalid_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/plans"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/orders"))
            .respond_with(ResponseTemplate::new(500).set_body_string("stack trace"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.send(ProxyRequest::new(Method::GET, "plans")).await,
            Err(UpstreamError::InvalidResponse(_))
        ));
        assert!(matches!(
            client.send(ProxyRequest::new(Method::GET, "orders")).await,
            Err(UpstreamError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = UpstreamClient::new(
            format!("http://127.0.0.1:{port}"),
            "v1",
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(matches!(
            client.send(ProxyRequest::new(Method::GET, "bots")).await,
            Err(UpstreamError::Unavailable(_))
        ));
    }
}
