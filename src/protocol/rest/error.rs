//! REST API Error Types
//!
//! Provides error types and conversions for the REST API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::dto::{ApiErrorDto, ApiResponse};
use crate::error::AppError;

/// REST API error that can be returned from handlers
#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub error: ApiErrorDto,
}

impl RestError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiErrorDto {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.error.code, self.error.message);
        (self.status, Json(body)).into_response()
    }
}

// Conversions from domain errors
impl From<AppError> for RestError {
    fn from(err: AppError) -> Self {
        let message = err.to_string();
        match err {
            AppError::IdentityProvider { .. } => Self::unauthorized("LOGIN_FAILED", message),
            AppError::UnsupportedDeletion { .. } => {
                Self::conflict("UNSUPPORTED_DELETION", message)
            }
            AppError::InvalidState(_) => Self::conflict("INVALID_STATE", message),
            AppError::Deletion { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DELETION_FAILED",
                format!("{message}. Please try again."),
            ),
            AppError::InvalidDbName { .. }
            | AppError::ForeignDataPath { .. }
            | AppError::UnknownBaseData(_)
            | AppError::Json(_) => Self::bad_request(message),
            AppError::StoreExists(_) => Self::conflict("STORE_EXISTS", message),
            AppError::Io(_)
            | AppError::Config(_)
            | AppError::MissingSeedFile { .. }
            | AppError::InvalidCatalog(_)
            | AppError::Task(_) => {
                tracing::error!(error = %message, "request_failed");
                Self::internal(message)
            }
        }
    }
}

impl From<tokio::task::JoinError> for RestError {
    fn from(err: tokio::task::JoinError) -> Self {
        RestError::internal(format!("Background task failed: {err}"))
    }
}
