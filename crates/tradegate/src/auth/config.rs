//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Placeholder secret shipped in old sample configs. Never accepted outside development.
pub const INSECURE_DEFAULT_SECRET: &str = "dev-secret-change-in-production";

const MIN_SECRET_LENGTH: usize = 32;

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the trading backend's auth service.
    /// Accepts `env:VAR_NAME` to read the value from the environment.
    pub jwt_secret: Option<String>,

    /// Name of the cookie carrying the session token.
    pub cookie_name: String,

    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_secs: u64,

    /// Lifetime of the session cookie set on login.
    pub cookie_max_age_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            cookie_name: "token".to_string(),
            leeway_secs: 0,
            cookie_max_age_secs: 60 * 60 * 24,
        }
    }
}

impl AuthConfig {
    /// Resolve the JWT secret, expanding `env:VAR_NAME` syntax.
    /// Returns the resolved secret or None if not configured.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        match &self.jwt_secret {
            None => Ok(None),
            Some(value) => {
                if let Some(var_name) = value.strip_prefix("env:") {
                    match std::env::var(var_name) {
                        Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
                        Ok(_) => Err(ConfigValidationError::EnvVarEmpty(var_name.to_string())),
                        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var_name.to_string())),
                    }
                } else if value.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(value.clone()))
                }
            }
        }
    }

    /// Validate the configuration.
    ///
    /// `require_secret` is false only for the development tier, where a
    /// missing secret makes every protected call fail with 500 instead of
    /// refusing to start.
    pub fn validate(&self, require_secret: bool) -> Result<(), ConfigValidationError> {
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyCookieName);
        }

        let secret = self.resolve_jwt_secret()?;
        if !require_secret {
            return Ok(());
        }

        match secret {
            None => Err(ConfigValidationError::MissingJwtSecret),
            Some(secret) if secret == INSECURE_DEFAULT_SECRET => {
                Err(ConfigValidationError::InsecureJwtSecret)
            }
            Some(secret) if secret.len() < MIN_SECRET_LENGTH => {
                Err(ConfigValidationError::JwtSecretTooShort)
            }
            Some(_) => Ok(()),
        }
    }

    /// Generate a random alphanumeric secret suitable for HS256.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
        const SECRET_LENGTH: usize = 64;

        let mut rng = rand::rng();
        (0..SECRET_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// JWT secret is required outside development.
    MissingJwtSecret,
    /// JWT secret is the insecure placeholder value.
    InsecureJwtSecret,
    /// JWT secret is too short (minimum 32 characters).
    JwtSecretTooShort,
    /// Session cookie name is blank.
    EmptyCookieName,
    /// Environment variable not found (for `env:VAR_NAME` syntax).
    EnvVarNotFound(String),
    /// Environment variable is empty (for `env:VAR_NAME` syntax).
    EnvVarEmpty(String),
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingJwtSecret => write!(
                f,
                "JWT secret is required outside development. Set TRADEGATE__AUTH__JWT_SECRET or auth.jwt_secret in config."
            ),
            Self::InsecureJwtSecret => write!(
                f,
                "JWT secret cannot be the placeholder value outside development."
            ),
            Self::JwtSecretTooShort => write!(
                f,
                "JWT secret must be at least {MIN_SECRET_LENGTH} characters long."
            ),
            Self::EmptyCookieName => write!(f, "auth.cookie_name must not be empty."),
            Self::EnvVarNotFound(var) => write!(
                f,
                "Environment variable '{var}' not found (referenced via env:{var} in config)."
            ),
            Self::EnvVarEmpty(var) => write!(
                f,
                "Environment variable '{var}' is empty (referenced via env:{var} in config)."
            ),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: Some(secret.to_string()),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.cookie_name, "token");
        assert_eq!(config.leeway_secs, 0);
    }

    #[test]
    fn test_validation_development_without_secret() {
        assert!(AuthConfig::default().validate(false).is_ok());
    }

    #[test]
    fn test_validation_requires_secret() {
        assert_eq!(
            AuthConfig::default().validate(true).unwrap_err(),
            ConfigValidationError::MissingJwtSecret
        );
    }

    #[test]
    fn test_validation_rejects_placeholder_and_short_secrets() {
        assert_eq!(
            with_secret(INSECURE_DEFAULT_SECRET).validate(true).unwrap_err(),
            ConfigValidationError::InsecureJwtSecret
        );
        assert_eq!(
            with_secret("tooshort").validate(true).unwrap_err(),
            ConfigValidationError::JwtSecretTooShort
        );
        assert!(
            with_secret("a-very-long-and-secure-jwt-secret-that-is-at-least-32-chars")
                .validate(true)
                .is_ok()
        );
    }

    #[test]
    fn test_validation_rejects_blank_cookie_name() {
        let config = AuthConfig {
            cookie_name: "  ".to_string(),
            ..AuthConfig::default()
        };
        assert_eq!(
            config.validate(false).unwrap_err(),
            ConfigValidationError::EmptyCookieName
        );
    }

    #[test]
    fn test_generate_jwt_secret_passes_validation() {
        let secret = AuthConfig::generate_jwt_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(with_secret(&secret).validate(true).is_ok());
        assert_ne!(secret, AuthConfig::generate_jwt_secret());
    }

    #[test]
    fn test_resolve_jwt_secret_literal_and_blank() {
        assert_eq!(
            with_secret("my-literal-secret").resolve_jwt_secret().unwrap(),
            Some("my-literal-secret".to_string())
        );
        assert_eq!(with_secret("").resolve_jwt_secret().unwrap(), None);
    }

    #[test]
    fn test_resolve_jwt_secret_env_var() {
        // SAFETY: test-only environment variable with a unique name
        unsafe {
            std::env::set_var(
                "TRADEGATE_TEST_JWT_SECRET_7781",
                "secret-from-env-var-at-least-32-chars",
            );
        }

        let resolved = with_secret("env:TRADEGATE_TEST_JWT_SECRET_7781")
            .resolve_jwt_secret()
            .unwrap();
        assert_eq!(
            resolved,
            Some("secret-from-env-var-at-least-32-chars".to_string())
        );

        // SAFETY: cleaning up the variable set above
        unsafe {
            std::env::remove_var("TRADEGATE_TEST_JWT_SECRET_7781");
        }
    }

    #[test]
    fn test_resolve_jwt_secret_env_var_not_found() {
        assert_eq!(
            with_secret("env:TRADEGATE_MISSING_VAR_7781")
                .resolve_jwt_secret()
                .unwrap_err(),
            ConfigValidationError::EnvVarNotFound("TRADEGATE_MISSING_VAR_7781".to_string())
        );
    }

    #[test]
    fn test_resolve_jwt_secret_env_var_empty() {
        // SAFETY: test-only environment variable with a unique name
        unsafe {
            std::env::set_var("TRADEGATE_EMPTY_JWT_SECRET_7781", "");
        }

        assert_eq!(
            with_secret("env:TRADEGATE_EMPTY_JWT_SECRET_7781")
                .resolve_jwt_secret()
                .unwrap_err(),
            ConfigValidationError::EnvVarEmpty("TRADEGATE_EMPTY_JWT_SECRET_7781".to_string())
        );

        // SAFETY: cleaning up the variable set above
        unsafe {
            std::env::remove_var("TRADEGATE_EMPTY_JWT_SECRET_7781");
        }
    }
}
