//! Authentication errors.

use thiserror::Error;

/// Errors raised while issuing tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No signing secret available.
    #[error("token secret is not configured")]
    SecretNotConfigured,

    /// The JWT library refused to sign.
    #[error("failed to sign token: {0}")]
    Signing(String),
}
