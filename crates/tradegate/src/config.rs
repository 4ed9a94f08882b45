//! Gateway configuration.
//!
//! Sources, lowest priority first: built-in defaults, the TOML config file,
//! then `TRADEGATE__SECTION__KEY` environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment as EnvSource, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{AuthConfig, ConfigValidationError};

pub const APP_NAME: &str = "tradegate";
pub const ENV_PREFIX: &str = "TRADEGATE";

/// Upstream used by the development tier when none is configured.
pub const DEV_UPSTREAM_URL: &str = "http://localhost:8000";

/// Resources proxied when the config does not list any.
pub const DEFAULT_RESOURCES: &[&str] = &[
    "bots",
    "plans",
    "brokers",
    "trade-logs",
    "schedules",
    "orders",
];

/// Deployment tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Environment::Development)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment tier; development enables test-support endpoints.
    pub environment: Environment,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
    pub gate: GateConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Trading backend the gateway forwards to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://api.example.com`. Required outside development.
    pub base_url: Option<String>,
    /// Path segment inserted before every resource (`/v1/bots`).
    pub api_version: String,
    /// Connect and request timeout for each upstream call.
    pub timeout_secs: u64,
    /// Resource names exposed under `/api/<name>`.
    pub resources: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_version: "v1".to_string(),
            timeout_secs: 30,
            resources: DEFAULT_RESOURCES.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// Auth gate settings. The listed paths extend the built-in allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub login_path: String,
    /// Query parameter carrying the original path on redirect.
    pub redirect_param: String,
    pub public_paths: Vec<String>,
    pub public_prefixes: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            redirect_param: "redirect".to_string(),
            public_paths: Vec::new(),
            public_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Problems that prevent the gateway from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Auth(#[from] ConfigValidationError),

    #[error("upstream.base_url is required in the {0} environment")]
    MissingUpstreamUrl(Environment),

    #[error("upstream.base_url is not a valid http(s) URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("upstream.resources must list at least one resource")]
    NoResources,

    #[error("invalid resource name '{0}': use lowercase letters, digits and '-'")]
    InvalidResource(String),

    #[error("gate.login_path must start with '/': {0}")]
    InvalidLoginPath(String),
}

impl AppConfig {
    /// Load from the given file (optional) and `TRADEGATE__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("logging.level", "info")?;

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let built = builder
            .add_source(
                EnvSource::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("upstream.resources")
                    .with_list_parse_key("cors.allowed_origins")
                    .with_list_parse_key("gate.public_paths")
                    .with_list_parse_key("gate.public_prefixes"),
            )
            .build()
            .context("building configuration")?;

        built
            .try_deserialize()
            .context("deserializing configuration")
    }

    /// Check everything the server needs before binding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate(!self.environment.is_development())?;
        self.upstream_base_url()?;

        if self.upstream.resources.is_empty() {
            return Err(ConfigError::NoResources);
        }
        if let Some(bad) = self
            .upstream
            .resources
            .iter()
            .find(|r| !is_valid_resource_name(r))
        {
            return Err(ConfigError::InvalidResource(bad.clone()));
        }

        if !self.gate.login_path.starts_with('/') {
            return Err(ConfigError::InvalidLoginPath(self.gate.login_path.clone()));
        }

        Ok(())
    }

    /// Effective upstream base URL without a trailing slash.
    pub fn upstream_base_url(&self) -> Result<String, ConfigError> {
        let raw = match self.upstream.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ if self.environment.is_development() => DEV_UPSTREAM_URL.to_string(),
            _ => return Err(ConfigError::MissingUpstreamUrl(self.environment)),
        };

        let parsed =
            reqwest::Url::parse(&raw).map_err(|_| ConfigError::InvalidUpstreamUrl(raw.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidUpstreamUrl(raw));
        }

        Ok(raw.trim_end_matches('/').to_string())
    }

    /// Copy safe to print: the secret is replaced unless it is an `env:` reference.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(secret) = copy.auth.jwt_secret.as_mut()
            && !secret.starts_with("env:")
        {
            *secret = "<redacted>".to_string();
        }
        copy
    }
}

fn is_valid_resource_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Resolve the config file path, expanding `~` and `$VARS` in overrides.
pub fn resolve_config_path(override_path: Option<&Path>) -> Result<PathBuf> {
    match override_path {
        Some(path) => {
            let raw = path.to_string_lossy();
            let expanded = shellexpand::full(&raw)
                .with_context(|| format!("expanding config path {raw}"))?;
            let expanded = PathBuf::from(expanded.as_ref());
            if expanded.is_dir() {
                Ok(expanded.join("config.toml"))
            } else {
                Ok(expanded)
            }
        }
        None => {
            let dir = dirs::config_dir()
                .ok_or_else(|| anyhow!("unable to determine config directory"))?;
            Ok(dir.join(APP_NAME).join("config.toml"))
        }
    }
}

/// Write the default configuration as commented TOML, with a freshly
/// generated `auth.jwt_secret`.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(AuthConfig::generate_jwt_secret());

    let toml =
        toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# Every key can be overridden with TRADEGATE__SECTION__KEY.\n");
    body.push_str("# auth.jwt_secret must match the trading backend's signing secret (or use env:VAR_NAME).\n");
    body.push_str("# Set upstream.base_url before deploying.\n\n");
    body.push_str(&toml);

    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}
