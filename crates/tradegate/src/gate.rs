//! Auth gate middleware.
//!
//! Classifies every inbound path as public or protected and stops protected
//! requests that carry no credential evidence at all. The gate only checks
//! presence: an expired or forged token still reaches the handler, which
//! performs full verification.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{Method, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::api::ApiError;
use crate::auth::Credential;
use crate::config::GateConfig;

const PUBLIC_PATHS: &[&str] = &[
    "/",
    "/login",
    "/register",
    "/favicon.ico",
    "/robots.txt",
    "/api/health",
];

const PUBLIC_PREFIXES: &[&str] = &[
    "/_next/",
    "/static/",
    "/assets/",
    "/images/",
    "/api/auth/",
    "/api/test/",
];

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "svg", "ico", "webp", "woff", "woff2", "map", "txt",
];

/// Result of classifying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Public,
    ProtectedApi,
    ProtectedPage,
}

/// Allow-list and redirect settings for the gate.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    public_paths: Vec<String>,
    public_prefixes: Vec<String>,
    login_path: String,
    redirect_param: String,
    cookie_name: String,
}

impl GatePolicy {
    /// Built-in allow-list extended by config. The login page is always public.
    pub fn new(config: &GateConfig, cookie_name: &str) -> Self {
        let mut public_paths: Vec<String> = PUBLIC_PATHS.iter().map(|p| p.to_string()).collect();
        public_paths.extend(config.public_paths.iter().cloned());
        if !public_paths.contains(&config.login_path) {
            public_paths.push(config.login_path.clone());
        }

        let mut public_prefixes: Vec<String> =
            PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect();
        public_prefixes.extend(config.public_prefixes.iter().cloned());

        Self {
            public_paths,
            public_prefixes,
            login_path: config.login_path.clone(),
            redirect_param: config.redirect_param.clone(),
            cookie_name: cookie_name.to_string(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn classify(&self, method: &Method, path: &str) -> PathClass {
        if method == Method::OPTIONS {
            return PathClass::Public;
        }

        if self.public_paths.iter().any(|p| p == path) {
            return PathClass::Public;
        }

        if self.public_prefixes.iter().any(|prefix| {
            path.starts_with(prefix.as_str()) || path == prefix.trim_end_matches('/')
        }) {
            return PathClass::Public;
        }

        if is_api_path(path) {
            return PathClass::ProtectedApi;
        }

        if is_static_asset(path) {
            return PathClass::Public;
        }

        PathClass::ProtectedPage
    }

    /// Login URL carrying the original path and query for post-login return.
    pub fn login_redirect(&self, original: &Uri) -> String {
        let target = original
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| original.path());

        format!(
            "{}?{}={}",
            self.login_path,
            self.redirect_param,
            urlencoding::encode(target)
        )
    }
}

fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

fn is_static_asset(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => STATIC_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Gate middleware.
///
/// - public paths pass unchanged
/// - protected API paths without evidence get a 401 envelope
/// - protected page paths without evidence are redirected to the login page
pub async fn gate_middleware(
    State(policy): State<Arc<GatePolicy>>,
    req: Request,
    next: Next,
) -> Response {
    let class = policy.classify(req.method(), req.uri().path());
    if class == PathClass::Public {
        return next.run(req).await;
    }

    if Credential::from_headers(req.headers(), policy.cookie_name()).is_some() {
        return next.run(req).await;
    }

    match class {
        PathClass::ProtectedApi => {
            debug!(path = %req.uri().path(), "rejecting unauthenticated API request");
            ApiError::unauthorized("Authentication required").into_response()
        }
        _ => {
            let location = policy.login_redirect(req.uri());
            debug!(path = %req.uri().path(), %location, "redirecting unauthenticated page request");
            Redirect::temporary(&location).into_response()
        }
    }
}
