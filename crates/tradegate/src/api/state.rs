//! Application state shared across handlers.
//!
//! Everything here is read-only after startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::auth::TokenVerifier;
use crate::config::{AppConfig, Environment};
use crate::gate::GatePolicy;
use crate::upstream::UpstreamClient;

/// Session cookie attributes.
#[derive(Clone, Debug)]
pub struct CookieSettings {
    pub name: String,
    pub max_age_secs: u64,
    /// Add the `Secure` attribute (everything but development).
    pub secure: bool,
}

impl CookieSettings {
    /// `Set-Cookie` value storing `token`.
    pub fn session_cookie(&self, token: &str) -> String {
        self.render(token, self.max_age_secs)
    }

    /// `Set-Cookie` value that expires the session cookie.
    pub fn cleared_cookie(&self) -> String {
        self.render("", 0)
    }

    fn render(&self, value: &str, max_age: u64) -> String {
        let secure_flag = if self.secure { " Secure;" } else { "" };
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax;{} Max-Age={}",
            self.name, value, secure_flag, max_age
        )
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token verifier holding the shared secret.
    pub verifier: TokenVerifier,
    /// Client for the trading backend.
    pub upstream: UpstreamClient,
    /// Auth gate allow-list.
    pub gate: Arc<GatePolicy>,
    /// Resource names exposed under `/api/<name>`.
    pub resources: Arc<Vec<String>>,
    /// Allowed CORS origins. Empty allows any.
    pub allowed_origins: Arc<Vec<String>>,
    pub cookie: CookieSettings,
    pub environment: Environment,
}

impl AppState {
    /// Build state from a validated configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let verifier =
            TokenVerifier::from_config(&config.auth).context("resolving auth.jwt_secret")?;
        let base_url = config
            .upstream_base_url()
            .context("resolving upstream.base_url")?;
        let upstream = UpstreamClient::new(
            base_url,
            config.upstream.api_version.clone(),
            Duration::from_secs(config.upstream.timeout_secs.max(1)),
        )
        .context("building upstream HTTP client")?;

        Ok(Self::new(config, verifier, upstream))
    }

    /// Assemble state from already-built parts.
    pub fn new(config: &AppConfig, verifier: TokenVerifier, upstream: UpstreamClient) -> Self {
        Self {
            verifier,
            upstream,
            gate: Arc::new(GatePolicy::new(&config.gate, &config.auth.cookie_name)),
            resources: Arc::new(config.upstream.resources.clone()),
            allowed_origins: Arc::new(config.cors.allowed_origins.clone()),
            cookie: CookieSettings {
                name: config.auth.cookie_name.clone(),
                max_age_secs: config.auth.cookie_max_age_secs,
                secure: !config.environment.is_development(),
            },
            environment: config.environment,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }
}
