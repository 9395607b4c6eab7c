//! Request handlers and response bodies.
//!
//! Successful responses use the `{ "success": true, "data": ... }` envelope.

use super::error::ApiError;
use super::AppState;
use crate::error::Doc2PdfError;
use crate::ingress::{accept_upload, Upload};
use crate::pipeline::QueueStatus;
use crate::task::{ConversionTask, TaskStatus};
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Read size for streamed downloads.
const DOWNLOAD_CHUNK: usize = 64 * 1024;

// ── Response bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub file_id: String,
    pub original_name: String,
    pub size: u64,
    pub status: TaskStatus,
}

/// Public view of a task. Filesystem paths are replaced by a download URL.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub file_id: String,
    pub original_name: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ConversionTask> for TaskView {
    fn from(task: &ConversionTask) -> Self {
        Self {
            file_id: task.id.to_string(),
            original_name: task.original_name.clone(),
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
            pdf_url: (task.status == TaskStatus::Converted)
                .then(|| format!("/download/{}", task.id)),
            error: task.error_detail.clone(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// `POST /upload`: multipart field `file`. The body is read chunk by chunk
/// and abandoned as soon as it exceeds the size limit.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UploadAccepted>>), ApiError> {
    let mut upload: Option<Upload> = None;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            state.uploads.check_size((bytes.len() + chunk.len()) as u64)?;
            bytes.extend_from_slice(&chunk);
        }
        upload = Some(Upload {
            file_name,
            content_type,
            bytes,
        });
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    let size = upload.bytes.len() as u64;
    let task = accept_upload(&state.pipeline, &state.uploads, upload).await?;

    Ok((
        StatusCode::ACCEPTED,
        ApiResponse::ok(UploadAccepted {
            file_id: task.id.to_string(),
            original_name: task.original_name,
            size,
            status: task.status,
        }),
    ))
}

/// `GET /convert/status/{id}`
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TaskView>>, ApiError> {
    let task = state.pipeline.find(&id)?;
    Ok(ApiResponse::ok(TaskView::from(&task)))
}

/// `POST /convert/start/{id}`: queue a `received` task.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<TaskView>>), ApiError> {
    let task = state.pipeline.find(&id)?;
    let task = state.pipeline.start(&task.id)?;
    Ok((StatusCode::ACCEPTED, ApiResponse::ok(TaskView::from(&task))))
}

/// `GET /download/{id}`: stream the PDF of a converted task.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let task = state.pipeline.find(&id)?;
    let path = match (task.status, &task.output_path) {
        (TaskStatus::Converted, Some(path)) => path.clone(),
        (TaskStatus::Converted, None) => {
            return Err(Doc2PdfError::Internal(format!("task {} has no output path", task.id)).into())
        }
        (status, _) => {
            return Err(Doc2PdfError::InvalidState {
                id: task.id,
                status,
                expected: TaskStatus::Converted,
            }
            .into())
        }
    };

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| Doc2PdfError::storage(&path, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| Doc2PdfError::storage(&path, e))?
        .len();

    // Stops after the first read error.
    let stream = futures::stream::unfold(Some(file), |file| async move {
        let mut file = file?;
        let mut buf = vec![0u8; DOWNLOAD_CHUNK];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    });

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.pdf\"", task.id),
        ),
        (header::CONTENT_LENGTH, len.to_string()),
    ];
    Ok((headers, Body::from_stream(stream)).into_response())
}

/// `GET /queue/status`
pub async fn queue_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<QueueStatus>> {
    ApiResponse::ok(state.pipeline.queue_status())
}

/// `GET /tasks`
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<TaskView>>> {
    let tasks = state.pipeline.tasks();
    ApiResponse::ok(tasks.iter().map(TaskView::from).collect())
}

/// `DELETE /tasks/{id}`: remove a finished task and its files.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TaskView>>, ApiError> {
    let task = state.pipeline.find(&id)?;
    let removed = state.pipeline.cleanup(&task.id).await?;
    Ok(ApiResponse::ok(TaskView::from(&removed)))
}
