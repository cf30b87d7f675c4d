//! Error types for the gateway.
//!
//! `GatewayError` is the taxonomy surfaced by the request pipeline. Only the
//! authentication, access and transport classes ever reach a caller; the
//! accounting classes are logged and degrade usage fidelity instead.

use http::StatusCode;

/// Result alias used across the pipeline.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Missing, malformed, unknown or inactive API key.
    #[error("{message}")]
    Auth {
        /// Message returned to the caller
        message: String,
    },

    /// The organization is not granted the requested model.
    #[error("organization does not have access to model: {model}")]
    AccessDenied {
        /// Model identifier taken from the request body
        model: String,
    },

    /// The request body could not be parsed to find the model.
    #[error("failed to detect model: {0}")]
    Detection(String),

    /// Every attempt failed without an upstream response.
    #[error("failed to reach provider: {0}")]
    UpstreamUnreachable(String),

    /// The upstream response body could not be read.
    #[error("failed to read provider response: {0}")]
    UpstreamRead(String),

    /// Usage counters could not be extracted from a response.
    #[error("usage extraction failed: {0}")]
    UsageExtraction(String),

    /// The usage queue was at capacity.
    #[error("usage queue is full")]
    QueueFull,

    /// A storage write failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Invalid runtime configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Authentication failure with the generic invalid-key message.
    #[must_use]
    pub fn invalid_key() -> Self {
        Self::Auth {
            message: "Invalid or inactive API key".to_string(),
        }
    }

    /// Authentication failure for an absent or malformed token.
    #[must_use]
    pub fn missing_token() -> Self {
        Self::Auth {
            message: "Missing or invalid authorization token".to_string(),
        }
    }

    /// Access denied for a model.
    pub fn access_denied(model: impl Into<String>) -> Self {
        Self::AccessDenied {
            model: model.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Self::Detection(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamRead(_)
            | Self::UsageExtraction(_)
            | Self::Persistence(_)
            | Self::Configuration(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "authentication_error",
            Self::AccessDenied { .. } => "access_denied",
            Self::Detection(_) => "invalid_request",
            Self::UpstreamUnreachable(_) | Self::UpstreamRead(_) => "gateway_error",
            Self::UsageExtraction(_) => "usage_extraction_error",
            Self::QueueFull => "queue_full",
            Self::Persistence(_) => "persistence_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the error is visible to API callers.
    #[must_use]
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. }
                | Self::AccessDenied { .. }
                | Self::Detection(_)
                | Self::UpstreamUnreachable(_)
                | Self::UpstreamRead(_)
                | Self::Configuration(_)
                | Self::Internal(_)
        )
    }
}

/// Storage error type shared by every store implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not obtain a connection.
    #[error("storage connection error: {0}")]
    Connection(String),

    /// Statement failed to execute.
    #[error("storage query error: {0}")]
    Query(String),

    /// A row could not be decoded into a domain type.
    #[error("storage decode error: {0}")]
    Decode(String),

    /// Expected row was absent.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Check if the error is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Query(_))
    }
}
