use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use dlq_engine::DlqError;

/// Engine error rendered as `{"error": code, "message": text}`, plus
/// `completed` when the operation stopped part-way.
#[derive(Debug)]
pub struct ApiError(pub DlqError);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<usize>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DlqError::InvalidRequest(_) | DlqError::InvalidEncoding { .. } => StatusCode::BAD_REQUEST,
            DlqError::BrokerUnavailable(_) => StatusCode::BAD_GATEWAY,
            DlqError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DlqError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DlqError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match &self.0 {
            DlqError::InvalidRequest(_) => "invalid_request",
            DlqError::InvalidEncoding { .. } => "invalid_encoding",
            DlqError::BrokerUnavailable(_) => "broker_unavailable",
            DlqError::Timeout(_) => "timeout",
            DlqError::Cancelled { .. } => "cancelled",
            DlqError::Config(_) => "config",
        }
    }
}

impl From<DlqError> for ApiError {
    fn from(e: DlqError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.0.to_string(),
            completed: self.0.completed(),
        };
        (status, axum::Json(body)).into_response()
    }
}
