use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use portcullis_core::{Decision, Error, error::ValidationError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    RateLimited {
        message: String,
        blocked_until: Option<DateTime<Utc>>,
        retry_after: i64,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("Failed to send verification code")]
    SendFailed,

    #[error("Invalid or expired verification code")]
    VerifyFailed,

    #[error("Service temporarily unavailable")]
    StorageUnavailable,
}

impl ApiError {
    /// Build the 429 response payload from a denied decision.
    pub fn rate_limited(decision: &Decision) -> Self {
        let blocked_until = match decision {
            Decision::Denied { blocked_until, .. } => Some(*blocked_until),
            Decision::Allowed => None,
        };
        ApiError::RateLimited {
            message: decision
                .message()
                .unwrap_or_else(|| "Too many attempts. Please try again later.".to_string()),
            blocked_until,
            retry_after: decision.retry_after_seconds().unwrap_or(60),
        }
    }

    /// Map a validation failure to the message shown to end users.
    pub fn invalid_email(error: &Error) -> Self {
        let message = match error {
            Error::Validation(ValidationError::BlockedDomain(_)) => {
                "Test email domains are not allowed. Please use your real email address."
            }
            _ => "Please enter a valid email address",
        };
        ApiError::BadRequest(message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RateLimited {
                message,
                blocked_until,
                retry_after,
            } => {
                let body = Json(json!({
                    "error": message,
                    "blocked_until": blocked_until.map(|b| b.to_rfc3339()),
                    "retry_after": retry_after,
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::VerifyFailed => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid or expired verification code" })),
            )
                .into_response(),
            ApiError::SendFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to send verification code" })),
            )
                .into_response(),
            ApiError::StorageUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "Service temporarily unavailable" })),
            )
                .into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
