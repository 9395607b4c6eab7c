//! HTTP error mapping.
//!
//! Every handler returns `Result<T, ApiError>`. Client errors carry their
//! message; storage and internal errors are logged in full and answered with
//! a generic message so filesystem paths never reach the client.

use crate::error::{Doc2PdfError, ErrorKind};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] Doc2PdfError),

    /// The request itself is malformed (e.g. no `file` field).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The multipart body could not be read; carries its own status
    /// (413 when the body limit was hit).
    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvalidState => StatusCode::CONFLICT,
                ErrorKind::Validation => match e {
                    Doc2PdfError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                },
                ErrorKind::Io | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Pipeline(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %e, "request failed");
                "internal server error".to_owned()
            }
            ApiError::Pipeline(e) => e.to_string(),
            ApiError::BadRequest(m) => m.clone(),
            ApiError::Multipart(e) => e.body_text(),
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskId, TaskStatus};

    fn status_of(e: Doc2PdfError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn pipeline_errors_map_to_statuses() {
        assert_eq!(status_of(Doc2PdfError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(Doc2PdfError::InvalidState {
                id: TaskId::new("t1").unwrap(),
                status: TaskStatus::Converting,
                expected: TaskStatus::Converted,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(Doc2PdfError::FileTooLarge { size: 2, limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_of(Doc2PdfError::EmptyUpload {
                file_name: "a.txt".into()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Doc2PdfError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn storage_errors_do_not_leak_paths() {
        use http_body_util::BodyExt;

        let e = Doc2PdfError::storage(
            "/srv/secret/uploads/t1.docx",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let response = ApiError::from(e).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("/srv/secret"), "got: {text}");
        assert!(text.contains("internal server error"));
    }
}
