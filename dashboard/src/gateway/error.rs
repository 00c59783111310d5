//! Error types for backend gateway operations.
//!
//! Every remote call funnels its failures into [`GatewayError`], with
//! structured context describing which operation and endpoint failed and
//! whether a retry may help.

use std::fmt;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Structured context for gateway errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    /// The gateway operation (e.g., "fetch_map_only", "fetch_full_analysis")
    pub operation: Option<String>,
    /// Backend endpoint path (e.g., "/geomapFilter")
    pub endpoint: Option<String>,
    /// HTTP status code if one was received
    pub status: Option<u16>,
    /// Additional details about the error
    pub details: Option<String>,
    /// Whether this error is retryable
    pub retryable: bool,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark this error as retryable.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref endpoint) = self.endpoint {
            parts.push(format!("endpoint={}", endpoint));
        }
        if let Some(status) = self.status {
            parts.push(format!("status={}", status));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Error type for gateway operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Connection refused, reset, DNS failure. Usually transient.
    #[error("Transport error: {message} {context}")]
    Transport {
        message: String,
        context: ErrorContext,
    },

    /// The request did not complete within the configured timeout.
    #[error("Timeout error: {message} {context}")]
    Timeout {
        message: String,
        context: ErrorContext,
    },

    /// Non-2xx response.
    #[error("HTTP status error: {message} {context}")]
    Status {
        message: String,
        context: ErrorContext,
    },

    /// Response body was not the expected JSON shape.
    #[error("Decode error: {message} {context}")]
    Decode {
        message: String,
        context: ErrorContext,
    },

    /// The backend answered 2xx with an `{error}` body.
    #[error("Backend error: {message} {context}")]
    Backend {
        message: String,
        context: ErrorContext,
    },

    /// The query matched zero records. Not a failure from the user's point
    /// of view; callers show guidance instead of an alert.
    #[error("Empty selection: {message} {context}")]
    EmptySelection {
        message: String,
        context: ErrorContext,
    },

    /// Invalid client configuration (bad base URL and the like).
    #[error("Configuration error: {message} {context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// The backend cannot serve this operation right now.
    #[error("Unavailable: {message} {context}")]
    Unavailable {
        message: String,
        context: ErrorContext,
    },
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    /// Status errors are retryable for 5xx only.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        let context = ErrorContext::default().with_status(status);
        let context = if status >= 500 { context.retryable() } else { context };
        Self::Status {
            message: message.into(),
            context,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn empty_selection(message: impl Into<String>) -> Self {
        Self::EmptySelection {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.context().retryable
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_empty_selection(&self) -> bool {
        matches!(self, Self::EmptySelection { .. })
    }

    /// The bare message without context decoration.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. }
            | Self::Timeout { message, .. }
            | Self::Status { message, .. }
            | Self::Decode { message, .. }
            | Self::Backend { message, .. }
            | Self::EmptySelection { message, .. }
            | Self::Configuration { message, .. }
            | Self::Unavailable { message, .. } => message,
        }
    }

    /// Get the error context.
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Transport { context, .. }
            | Self::Timeout { context, .. }
            | Self::Status { context, .. }
            | Self::Decode { context, .. }
            | Self::Backend { context, .. }
            | Self::EmptySelection { context, .. }
            | Self::Configuration { context, .. }
            | Self::Unavailable { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Transport { context, .. }
            | Self::Timeout { context, .. }
            | Self::Status { context, .. }
            | Self::Decode { context, .. }
            | Self::Backend { context, .. }
            | Self::EmptySelection { context, .. }
            | Self::Configuration { context, .. }
            | Self::Unavailable { context, .. } => context,
        }
    }

    /// Add or update the operation in the error context.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.context_mut().endpoint = Some(endpoint.into());
        self
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::timeout(err.to_string())
        } else if err.is_decode() {
            GatewayError::decode(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::status(status.as_u16(), err.to_string())
        } else if err.is_builder() {
            GatewayError::configuration(err.to_string())
        } else {
            GatewayError::transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let err = GatewayError::status(502, "bad gateway")
            .with_operation("fetch_map_only")
            .with_endpoint("/geomapFilter");
        let text = err.to_string();
        assert!(text.contains("operation=fetch_map_only"));
        assert!(text.contains("endpoint=/geomapFilter"));
        assert!(text.contains("status=502"));
        assert!(text.contains("retryable=true"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::transport("reset").is_retryable());
        assert!(GatewayError::timeout("slow").is_retryable());
        assert!(GatewayError::status(503, "down").is_retryable());
        assert!(!GatewayError::status(400, "bad").is_retryable());
        assert!(!GatewayError::decode("junk").is_retryable());
        assert!(!GatewayError::empty_selection("none").is_retryable());
    }

    #[test]
    fn test_empty_selection_is_distinct() {
        let err = GatewayError::empty_selection("No data available");
        assert!(err.is_empty_selection());
        assert!(!GatewayError::backend("boom").is_empty_selection());
        assert_eq!(err.message(), "No data available");
    }
}
