//! # doc2pdf
//!
//! Convert office documents (Word, Excel, PowerPoint, plain text) to PDF
//! through a headless LibreOffice, one conversion at a time.
//!
//! ## Why one at a time?
//!
//! LibreOffice is memory-hungry and its profile directory does not tolerate
//! concurrent instances. Every request goes through a single FIFO queue
//! drained by a single worker, so callers never wait for a conversion and the
//! converter never runs twice in parallel.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Ingress    validate type/size, store as <upload_dir>/<id>.<ext>
//!  ├─ 2. Submit     register the task as `received`
//!  ├─ 3. Enqueue    append to the FIFO, arm the worker if idle
//!  ├─ 4. Convert    soffice --headless --convert-to pdf (bounded by a timeout)
//!  └─ 5. Record     `converted` with <output_dir>/<id>.pdf, or `failed` with the reason
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2pdf::{accept_file, PipelineConfig, TaskPipeline, TaskStatus, UploadStore};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .converter_path("soffice")
//!         .output_dir("./output")
//!         .build()?;
//!     config.ensure_directories().await?;
//!
//!     let pipeline = TaskPipeline::new(&config)?;
//!     let uploads = UploadStore::from_config(&config);
//!
//!     let task = accept_file(&pipeline, &uploads, Path::new("report.docx")).await?;
//!     pipeline.wait_idle().await;
//!
//!     let task = pipeline.get_task(&task.id)?;
//!     match task.status {
//!         TaskStatus::Converted => println!("PDF at {:?}", task.output_path),
//!         _ => eprintln!("failed: {:?}", task.error_detail),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | axum HTTP adapter ([`server`]) |
//! | `cli`    | on      | The `doc2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Library-only use:
//! ```toml
//! doc2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod error;
pub mod ingress;
pub mod observer;
pub mod pipeline;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use converter::{ConversionRequest, Converter, SofficeConverter};
pub use error::{ConversionError, Doc2PdfError, ErrorKind, FailureKind};
pub use ingress::{accept_file, accept_upload, DocumentKind, Upload, UploadStore};
pub use observer::{NoopObserver, PipelineObserver, SharedObserver};
pub use pipeline::{QueueStatus, TaskPipeline};
pub use store::{MemoryTaskStore, TaskStore};
pub use task::{ConversionTask, TaskId, TaskStatus, Transition};
