//! Error types for keel-apiserver

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crate::portal::PortalError;
use keel_client::{ClientError, KubeletClientError};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while assembling the API server.
#[derive(Debug, Error)]
pub enum ApiServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown admission plugin: {0}")]
    UnknownAdmissionPlugin(String),

    #[error("Unknown authorization mode: {0}")]
    UnknownAuthorizationMode(String),

    #[error("Kubelet client error: {0}")]
    Kubelet(#[from] KubeletClientError),
}

/// Request level errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ClientError::AlreadyExists { .. } | ClientError::Conflict { .. } => {
                ApiError::Conflict(err.to_string())
            }
            ClientError::Invalid { .. } => ApiError::Invalid(err.to_string()),
            ClientError::Codec(_) | ClientError::Storage(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        match err {
            PortalError::Exhausted(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::Invalid(err.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Invalid(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
