//! Error kinds for the scanning pipeline and their HTTP mapping.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure of a single scan request. Every variant aborts the whole request.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No file uploaded")]
    NoFileUploaded,

    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    #[error("Upload exceeds the size limit: {0}")]
    PayloadTooLarge(String),

    #[error("Failed to decode document: {0}")]
    Decode(String),

    #[error("OCR failed on page {page}: {message}")]
    OcrEngine { page: usize, message: String },

    #[error("Processing failed: {0}")]
    Processing(String),
}

impl From<std::io::Error> for ScanError {
    fn from(e: std::io::Error) -> Self {
        ScanError::Processing(e.to_string())
    }
}

impl From<MultipartError> for ScanError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ScanError::PayloadTooLarge(e.body_text())
        } else {
            ScanError::Multipart(e.body_text())
        }
    }
}

impl ScanError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanError::NoFileUploaded
            | ScanError::UnsupportedMediaType(_)
            | ScanError::Multipart(_) => StatusCode::BAD_REQUEST,
            ScanError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ScanError::Decode(_) | ScanError::OcrEngine { .. } | ScanError::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ScanError::UnsupportedMediaType(declared) => {
                tracing::warn!("Rejected upload with type {}", declared);
                "Unsupported file type".to_string()
            }
            e if status.is_client_error() => {
                tracing::warn!("Bad request: {}", e);
                e.to_string()
            }
            e => {
                tracing::error!("Scan failed: {}", e);
                e.to_string()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
