//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::gateway::GatewayError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    /// The analysis backend failed or refused the request
    Gateway(GatewayError),
}

impl AppError {
    fn gateway_response(err: GatewayError) -> (StatusCode, ApiError) {
        let details = err.context().to_string();
        let message = err.message().to_string();
        let (status, code) = match &err {
            GatewayError::EmptySelection { .. } => (StatusCode::NOT_FOUND, "NO_DATA"),
            GatewayError::Status { context, .. } => match context.status {
                Some(404) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                Some(status) if (400..500).contains(&status) => {
                    (StatusCode::BAD_REQUEST, "BACKEND_REJECTED")
                }
                _ => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
            },
            GatewayError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "BACKEND_TIMEOUT"),
            GatewayError::Transport { .. } | GatewayError::Unavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "BACKEND_UNAVAILABLE")
            }
            GatewayError::Decode { .. } | GatewayError::Backend { .. } => {
                (StatusCode::BAD_GATEWAY, "BACKEND_ERROR")
            }
            GatewayError::Configuration { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
        };
        (status, ApiError::new(code, message).with_details(details))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("INTERNAL_ERROR", msg),
            ),
            AppError::Gateway(err) => Self::gateway_response(err),
        };

        (status, Json(error)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
