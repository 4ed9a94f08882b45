//! JWT claims carried by dashboard session tokens.

use serde::{Deserialize, Serialize};

/// Claims issued by the trading backend's auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// User's email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// User's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Role assigned by the backend, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Claims {
    /// Minimal claims for a subject with the given lifetime window.
    pub fn new(sub: impl Into<String>, iat: i64, exp: i64) -> Self {
        Self {
            sub: sub.into(),
            exp,
            iat: Some(iat),
            iss: None,
            email: None,
            name: None,
            role: None,
        }
    }

    /// Get the display name for the user.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }

    /// Seconds remaining until `exp`, clamped at zero.
    pub fn seconds_remaining(&self, now: i64) -> i64 {
        (self.exp - now).max(0)
    }
}
