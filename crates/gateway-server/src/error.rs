//! API error responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::GatewayError;
use serde_json::{json, Value};
use tracing::error;

/// Error rendered as a JSON response.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    /// Create an error with an explicit status and body.
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// `{"error": {"message": .., "type": "gateway_error"}}` with `status`.
    pub fn gateway(status: StatusCode, message: &str) -> Self {
        Self::new(
            status,
            json!({ "error": { "message": message, "type": "gateway_error" } }),
        )
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// JSON body.
    pub fn body(&self) -> &Value {
        &self.body
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = err.status_code();
        match &err {
            GatewayError::Auth { message } => Self::new(status, json!({ "error": message })),
            GatewayError::UpstreamUnreachable(_) => Self::gateway(status, "failed to reach provider"),
            GatewayError::UpstreamRead(_) => {
                Self::gateway(status, "failed to read provider response")
            }
            GatewayError::Persistence(_) | GatewayError::Internal(_) => {
                error!(error = %err, "internal error");
                Self::new(
                    status,
                    json!({ "error": { "message": "internal server error", "type": err.error_code() } }),
                )
            }
            _ => Self::new(
                status,
                json!({ "error": { "message": err.to_string(), "type": err.error_code() } }),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}
