//! Error types for HubSpot and completion calls
//!
//! Errors are classified by where they came from:
//! - Transport: the request never got a response (network, timeout)
//! - UpstreamStatus / Shape: the remote answered, but not usefully
//! - InvalidInput: the caller sent missing or malformed fields

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Error type shared by the CRM adapter, the note reconciler and the chat bridge.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Unexpected response shape: {0}")]
    Shape(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl IntegrationError {
    /// True when the caller is at fault and the request must not be retried as-is.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IntegrationError::InvalidInput(_))
    }

    pub fn shape(what: impl Into<String>) -> Self {
        IntegrationError::Shape(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        IntegrationError::InvalidInput(what.into())
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IntegrationError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            IntegrationError::Shape(err.to_string())
        } else {
            IntegrationError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IntegrationError {
    fn from(err: serde_json::Error) -> Self {
        IntegrationError::Shape(err.to_string())
    }
}

/// JSON error body returned by the HTTP API.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors surfaced at the HTTP boundary.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a message naming the offending input.
    BadRequest(String),
    /// 404 for a contact that is neither upstream nor in the fixtures.
    NotFound(String),
    /// 500 with a generic message plus a diagnostic detail string.
    Internal { error: String, details: String },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap an integration error, labelling server-side failures with `context`.
    pub fn from_integration(context: &str, err: IntegrationError) -> Self {
        if err.is_client_error() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal {
                error: context.to_string(),
                details: err.to_string(),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            ApiError::BadRequest(error) | ApiError::NotFound(error) => ErrorBody {
                error,
                details: None,
            },
            ApiError::Internal { error, details } => ErrorBody {
                error,
                details: Some(details),
            },
        };
        (status, Json(body)).into_response()
    }
}
