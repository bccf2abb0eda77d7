//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers should return
//! `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::AccountError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Account operation failed.
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(
            self,
            Self::Internal(_) | Self::Account(AccountError::Store(_))
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Account(err) => match err {
                // The original inbound contract: business-rule violations on
                // create are 400s, not 409s.
                AccountError::DuplicateEmail | AccountError::InvalidAddress => {
                    StatusCode::BAD_REQUEST
                }
                AccountError::NotFound(_) => StatusCode::NOT_FOUND,
                AccountError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Account(AccountError::Store(_)) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Account(err) => err.to_string(),
            Self::BadRequest(msg) => msg.clone(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
