//! Actix Web error adapters for server manager errors.
//!
//! Every error reaching a handler is rendered as `{"error": ..., "code": ...}`
//! with a status derived from the error kind.

use crate::error::Error;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::ServerNotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyRunning(_) => StatusCode::CONFLICT,
            Error::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
            Error::ConfigParse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error type returned by the API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body or query could not be understood.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The manager rejected the operation.
    #[error(transparent)]
    Manager(#[from] Error),
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Manager(e) => e.status_code(),
        }
    }
}

fn json_error(status_code: StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status_code)
        .content_type("application/json")
        .json(json!({
            "error": message,
            "code": status_code.as_u16()
        }))
}
