//! HS256 token verification.
//!
//! `TokenVerifier::verify` never fails: callers always get a tagged
//! [`Verification`] and decide how to render each [`Rejection`].

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use tracing::debug;

use super::{AuthConfig, AuthError, Claims, ConfigValidationError};

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No token was presented.
    #[error("no token presented")]
    Missing,

    /// Signature is fine but `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// Malformed token or signature mismatch.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// The gateway has no secret to check signatures with.
    #[error("token secret is not configured")]
    SecretNotConfigured,
}

/// Outcome of verifying a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(Claims),
    Rejected(Rejection),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    pub fn into_result(self) -> Result<Claims, Rejection> {
        match self {
            Verification::Valid(claims) => Ok(claims),
            Verification::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Verifies (and, for test support, mints) session tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: Option<DecodingKey>,
    encoding_key: Option<EncodingKey>,
    leeway_secs: u64,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("configured", &self.is_configured())
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl TokenVerifier {
    /// Build a verifier from a raw secret. `None` yields a verifier that
    /// rejects everything with [`Rejection::SecretNotConfigured`].
    pub fn new(secret: Option<&str>, leeway_secs: u64) -> Self {
        Self {
            decoding_key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            encoding_key: secret.map(|s| EncodingKey::from_secret(s.as_bytes())),
            leeway_secs,
        }
    }

    /// Build a verifier from auth config, resolving `env:VAR_NAME` secrets.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigValidationError> {
        let secret = config.resolve_jwt_secret()?;
        Ok(Self::new(secret.as_deref(), config.leeway_secs))
    }

    /// Whether a signing secret is available.
    pub fn is_configured(&self) -> bool {
        self.decoding_key.is_some()
    }

    /// Verify signature and expiry of `token`.
    pub fn verify(&self, token: &str) -> Verification {
        if token.trim().is_empty() {
            return Verification::Rejected(Rejection::Missing);
        }

        let Some(decoding_key) = self.decoding_key.as_ref() else {
            return Verification::Rejected(Rejection::SecretNotConfigured);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = self.leeway_secs;

        match decode::<Claims>(token, decoding_key, &validation) {
            Ok(data) => Verification::Valid(data.claims),
            Err(e) => {
                debug!(error = %e, "token rejected");
                match e.kind() {
                    ErrorKind::ExpiredSignature => Verification::Rejected(Rejection::Expired),
                    _ => Verification::Rejected(Rejection::Invalid(e.to_string())),
                }
            }
        }
    }

    /// Verify a possibly absent token.
    pub fn verify_optional(&self, token: Option<&str>) -> Verification {
        match token {
            Some(token) => self.verify(token),
            None => Verification::Rejected(Rejection::Missing),
        }
    }

    /// Sign arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let key = self
            .encoding_key
            .as_ref()
            .ok_or(AuthError::SecretNotConfigured)?;

        encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Mint a token for `subject` valid for `ttl` from now.
    pub fn mint(&self, subject: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2);
        self.sign(&Claims::new(subject, now, now.saturating_add(ttl)))
    }
}
