// ABOUTME: Error types for the HTTP front-end.
// ABOUTME: Every failure renders as the JSON envelope {status, code, message}.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use memewall_core::{AuthError, WallError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// JSON body returned by every meme route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub code: u16,
    pub message: String,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            status: "success".to_string(),
            code: StatusCode::OK.as_u16(),
            message: "OK".to_string(),
        }
    }

    pub fn error(code: StatusCode, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: code.as_u16(),
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[derive(Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Wall(#[from] WallError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Upload rejected: {0}")]
    WrongFileType(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),
}

pub type Result<T> = std::result::Result<T, ServeError>;

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::Wall(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ServeError::Auth(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::FORBIDDEN)
            }
            ServeError::WrongFileType(_) | ServeError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ServeError::Multipart(e) => e.status(),
        }
    }

    pub fn message_code(&self) -> &'static str {
        match self {
            ServeError::Wall(e) => e.message_code(),
            ServeError::Auth(e) => e.message_code(),
            ServeError::WrongFileType(_) => "W_VAL_WRONG_FILETYPE",
            ServeError::InvalidParams(_) | ServeError::Multipart(_) => "W_VAL_INVALID_PARAMS",
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, status = status.as_u16(), "Request failed");
        }
        ApiResponse::error(status, self.message_code()).into_response()
    }
}
