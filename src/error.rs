//! OAuth-style error responses: `{"error": .., "error_description": ..}` with a matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("unsupported_response_type")]
    UnsupportedResponseType,
    #[error("server_error: {0}")]
    ServerError(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl BridgeError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::ServerError(description.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedResponseType => StatusCode::BAD_REQUEST,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::ServerError(_) => "server_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let error_description = match self {
            Self::InvalidRequest(d) | Self::ServerError(d) => Some(d.clone()),
            Self::UnsupportedResponseType => None,
        };
        ErrorBody {
            error: self.code(),
            error_description,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
