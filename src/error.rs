//! Application error handling
//!
//! Libraries raise typed errors; handlers translate at the edge. Workers
//! never propagate to the queue runtime, they persist failure onto the job
//! row instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error response structure for consistent API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub detail: String,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Gone(String),

    #[error("{0}")]
    FeatureDisabled(String),

    #[error("Insufficient credits. Required: {required}, available: {available}. Top up credits to continue.")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Rate limit exceeded for {prefix}. Try again later.")]
    RateLimited { prefix: String },

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Database query failed")]
    Database(#[from] sqlx::Error),

    #[error("Redis operation failed: {0}")]
    Redis(String),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest(detail.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::FeatureDisabled(_) | AppError::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Gone(_) => "GONE",
            AppError::FeatureDisabled(_) => "FEATURE_DISABLED",
            AppError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Database(_) => "DATABASE_QUERY_FAILED",
            AppError::Redis(_) => "REDIS_OPERATION_FAILED",
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Single human-readable string suitable for display
    pub fn detail(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                "An unexpected error occurred".to_string()
            }
            AppError::Redis(_) => "Queue backend unavailable. Try again shortly.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();
        let detail = self.detail();

        match &self {
            AppError::Database(err) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %err,
                    "Database error occurred"
                );
            }
            AppError::Internal(err) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %err,
                    "Server error occurred"
                );
            }
            AppError::Redis(message) | AppError::ServiceUnavailable(message) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %message,
                    "Dependency unavailable"
                );
            }
            _ => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    error_code = %error_code,
                    error = %self,
                    "Client error occurred"
                );
            }
        }

        let body = ErrorResponse {
            error_code: error_code.to_string(),
            detail,
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for AppError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("Invalid JSON payload: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthenticated("Invalid or expired session token.".to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.into())
    }
}

/// Result type alias for application errors
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(
            AppError::bad_request("x").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::InsufficientCredits {
                required: 2,
                available: 0
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::FeatureDisabled("off".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Conflict("needs download".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = AppError::internal(anyhow::anyhow!("secret stack"));
        assert_eq!(err.detail(), "An unexpected error occurred");
    }
}
