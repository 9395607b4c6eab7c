//! HTTP adapter tests: the router is driven in-process with `oneshot`.

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use doc2pdf::server::{router, AppState};
use doc2pdf::{
    ConversionError, ConversionRequest, Converter, MemoryTaskStore, PipelineConfig, TaskId,
    TaskPipeline, UploadStore,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const PDF_BYTES: &[u8] = b"%PDF-1.4\n%test\n";
const BOUNDARY: &str = "doc2pdf-test-boundary";

// ── Test helpers ─────────────────────────────────────────────────────────────

struct InstantConverter;

#[async_trait]
impl Converter for InstantConverter {
    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConversionError> {
        let out = request.output_path();
        std::fs::create_dir_all(&request.output_dir).unwrap();
        std::fs::write(&out, PDF_BYTES).unwrap();
        Ok(out)
    }
}

/// Fails every task the way a converter does when the stored upload vanished.
struct MissingSourceConverter;

#[async_trait]
impl Converter for MissingSourceConverter {
    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConversionError> {
        Err(ConversionError::SourceMissing {
            path: request.source_path.clone(),
        })
    }
}

struct TestApp {
    _tmp: TempDir,
    config: PipelineConfig,
    pipeline: TaskPipeline,
    app: Router,
}

impl TestApp {
    fn new(max_file_size: u64) -> Self {
        Self::with_converter(max_file_size, Arc::new(InstantConverter))
    }

    fn with_converter(max_file_size: u64, converter: Arc<dyn Converter>) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .upload_dir(tmp.path().join("uploads"))
            .output_dir(tmp.path().join("output"))
            .max_file_size(max_file_size)
            .build()
            .unwrap();
        let pipeline = TaskPipeline::with_parts(
            &config,
            Arc::new(MemoryTaskStore::new()),
            converter,
        )
        .unwrap();
        let state = AppState::new(pipeline.clone(), UploadStore::from_config(&config));
        Self {
            _tmp: tmp,
            config,
            pipeline,
            app: router(Arc::new(state)),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn json(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn upload(&self, file_name: &str, content_type: &str, bytes: &[u8]) -> (StatusCode, Value) {
        let (status, body) = self
            .send(multipart_request(Some((file_name, content_type, bytes))))
            .await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}

fn multipart_request(file: Option<(&str, &str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"comment\"\r\n\r\nhello\r\n"
        )
        .as_bytes(),
    );
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// ── Status and queue ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_task_is_404() {
    let t = TestApp::new(1024);
    let (status, body) = t.json(Method::GET, "/convert/status/unknown-id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("unknown-id"));

    let (status, _) = t.json(Method::GET, "/convert/status/bad.id").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_queue_status_when_idle() {
    let t = TestApp::new(1024);
    let (status, body) = t.json(Method::GET, "/queue/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({
            "success": true,
            "data": { "pendingCount": 0, "isProcessing": false }
        })
    );
}

// ── Upload → status → download ───────────────────────────────────────────────

#[tokio::test]
async fn test_upload_convert_download() {
    let t = TestApp::new(1024);

    let (status, body) = t.upload("notes.txt", "text/plain", b"hello world").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["originalName"], "notes.txt");
    assert_eq!(body["data"]["size"], 11);
    assert_eq!(body["data"]["status"], "received");
    let id = body["data"]["fileId"].as_str().unwrap().to_string();

    t.pipeline.wait_idle().await;

    let (status, body) = t.json(Method::GET, &format!("/convert/status/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "converted");
    assert_eq!(body["data"]["pdfUrl"], format!("/download/{id}"));
    assert!(body["data"].get("outputPath").is_none());
    assert!(body["data"].get("sourcePath").is_none());

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/download/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{id}.pdf\"").as_str()
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], PDF_BYTES);

    let (status, body) = t.json(Method::GET, "/tasks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let t = TestApp::new(1024);
    let (status, body) = t.upload("photo.png", "image/png", b"\x89PNG").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(t.pipeline.tasks().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let t = TestApp::new(16);
    let (status, _) = t
        .upload("big.txt", "text/plain", &[b'x'; 64])
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(t.pipeline.tasks().is_empty());
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let t = TestApp::new(1024);
    let (status, body) = t.send(multipart_request(None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("No file"));
}

#[tokio::test]
async fn test_octet_stream_upload_uses_extension() {
    let t = TestApp::new(1024);
    let (status, body) = t
        .upload("deck.pptx", "application/octet-stream", b"PK\x03\x04")
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = TaskId::new(body["data"]["fileId"].as_str().unwrap()).unwrap();
    let task = t.pipeline.get_task(&id).unwrap();
    assert_eq!(task.source_path, t.config.upload_dir.join(format!("{id}.pptx")));
}

// ── Start, download state, cleanup ───────────────────────────────────────────

#[tokio::test]
async fn test_start_download_and_delete_follow_task_state() {
    let t = TestApp::new(1024);
    std::fs::create_dir_all(&t.config.upload_dir).unwrap();
    let source = t.config.upload_dir.join("t1.txt");
    std::fs::write(&source, b"hello").unwrap();
    t.pipeline
        .submit(TaskId::new("t1").unwrap(), "t1.txt", &source)
        .unwrap();

    // registered but not queued: nothing to download yet
    let (status, _) = t.json(Method::GET, "/download/t1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = t.json(Method::DELETE, "/tasks/t1").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = t.json(Method::POST, "/convert/start/t1").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["fileId"], "t1");
    t.pipeline.wait_idle().await;

    let (status, _) = t.json(Method::POST, "/convert/start/t1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = t.json(Method::POST, "/convert/start/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = t.json(Method::DELETE, "/tasks/t1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "converted");
    assert!(!source.exists());
    assert!(!t.config.output_dir.join("t1.pdf").exists());

    let (status, _) = t.json(Method::GET, "/convert/status/t1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_status_exposes_no_directories() {
    let t = TestApp::with_converter(1024, Arc::new(MissingSourceConverter));
    let (status, body) = t.upload("minutes.docx", "application/msword", b"\xd0\xcf\x11\xe0").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = body["data"]["fileId"].as_str().unwrap().to_string();
    t.pipeline.wait_idle().await;

    let uri = format!("/convert/status/{id}");
    let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
    let (status, raw) = t.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(raw).unwrap();
    assert!(!text.contains(&*t.config.upload_dir.to_string_lossy()), "got: {text}");
    assert!(!text.contains("uploads/"), "got: {text}");

    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(
        body["data"]["error"],
        format!("Source file not found: '{id}.doc'")
    );
}
