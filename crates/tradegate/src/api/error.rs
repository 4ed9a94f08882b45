//! Error envelope returned on every failure path.

use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::{AuthError, Rejection};
use crate::upstream::UpstreamError;

/// Marker header set on every error response.
pub static X_ERROR: HeaderName = HeaderName::from_static("x-error");

const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-2xx answer from the trading backend, relayed with its own status.
    #[error("Upstream rejected request ({status}): {message}")]
    Upstream { status: StatusCode, message: String },

    #[error("Gateway error: {0}")]
    BadGateway(String),

    /// Anything unexpected. The message is logged, never sent to the caller.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::BadGateway(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream { status, .. } => *status,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the envelope.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::BadGateway(msg) => msg.clone(),
            Self::Upstream { message, .. } => message.clone(),
            Self::Internal(_) => GENERIC_INTERNAL_MESSAGE.to_string(),
        }
    }
}

/// `{"error": "...", "status": 401}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ApiError::Internal(msg) => {
                error!(status = status.as_u16(), message = %msg, "API error");
            }
            ApiError::BadGateway(msg) => {
                error!(status = status.as_u16(), message = %msg, "Upstream unavailable");
            }
            ApiError::Upstream { message, .. } if status.is_server_error() => {
                warn!(status = status.as_u16(), message = %message, "Upstream server error");
            }
            _ => {
                tracing::debug!(status = status.as_u16(), message = %self, "Client error");
            }
        }

        let body = ErrorEnvelope {
            error: self.public_message(),
            status: status.as_u16(),
        };

        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(X_ERROR.clone(), HeaderValue::from_static("1"));
        response
    }
}

/// Map verifier rejections to caller-visible errors.
impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Missing => ApiError::unauthorized("Authentication required"),
            Rejection::Expired => ApiError::unauthorized("Session expired, please log in again"),
            Rejection::Invalid(_) => ApiError::forbidden("Invalid token"),
            Rejection::SecretNotConfigured => {
                ApiError::internal("token secret is not configured")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Unavailable(msg) => {
                tracing::debug!(error = %msg, "upstream unreachable");
                ApiError::bad_gateway("Trading backend is unavailable")
            }
            UpstreamError::Rejected { status, message } => ApiError::Upstream {
                status: envelope_status(status),
                message,
            },
            UpstreamError::InvalidResponse(msg) => {
                ApiError::internal(format!("unparseable upstream response: {msg}"))
            }
            UpstreamError::Request(msg) => ApiError::internal(msg),
        }
    }
}

/// Fold an upstream status into the set the envelope may carry.
fn envelope_status(status: StatusCode) -> StatusCode {
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY => status,
        s if s.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
