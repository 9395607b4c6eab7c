//! Upload validation and raw-file persistence.
//!
//! Everything that happens to an upload before the pipeline sees it:
//!
//! 1. classify the document from its MIME type, or from the file extension
//!    when the MIME type is missing or generic;
//! 2. enforce the size limit and reject empty files;
//! 3. write the bytes to `<upload_dir>/<task-id>.<ext>` through a temp file
//!    in the same directory, so the pipeline never sees a partial upload;
//! 4. [`TaskPipeline::submit`] and [`TaskPipeline::enqueue`].
//!
//! The stored extension always comes from [`DocumentKind::extension`], never
//! from the caller-supplied file name.

use crate::config::PipelineConfig;
use crate::error::Doc2PdfError;
use crate::pipeline::TaskPipeline;
use crate::task::{ConversionTask, TaskId};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ── Document kinds ───────────────────────────────────────────────────────────

/// Office document formats accepted for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Doc,
    Docx,
    Xls,
    Xlsx,
    Ppt,
    Pptx,
    Txt,
}

/// MIME types that say nothing about the content; the extension decides.
const GENERIC_MIME_TYPES: &[&str] = &[
    "",
    "application/octet-stream",
    "binary/octet-stream",
    "application/zip",
    "application/x-zip-compressed",
];

impl DocumentKind {
    pub const ALL: [DocumentKind; 7] = [
        DocumentKind::Doc,
        DocumentKind::Docx,
        DocumentKind::Xls,
        DocumentKind::Xlsx,
        DocumentKind::Ppt,
        DocumentKind::Pptx,
        DocumentKind::Txt,
    ];

    /// Canonical extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Doc => "doc",
            DocumentKind::Docx => "docx",
            DocumentKind::Xls => "xls",
            DocumentKind::Xlsx => "xlsx",
            DocumentKind::Ppt => "ppt",
            DocumentKind::Pptx => "pptx",
            DocumentKind::Txt => "txt",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            DocumentKind::Doc => "application/msword",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Xls => "application/vnd.ms-excel",
            DocumentKind::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            DocumentKind::Ppt => "application/vnd.ms-powerpoint",
            DocumentKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            DocumentKind::Txt => "text/plain",
        }
    }

    /// Match a `Content-Type` value. Parameters such as `; charset=utf-8` are
    /// ignored.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.mime() == essence)
    }

    /// Match the extension of a file name, case-insensitively.
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.extension() == ext)
    }

    /// Classify an upload. A specific MIME type wins; a missing or generic one
    /// defers to the extension. A specific but unsupported MIME type is
    /// rejected even if the extension looks right.
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Option<Self> {
        match content_type {
            Some(ct) => {
                if let Some(kind) = Self::from_mime(ct) {
                    return Some(kind);
                }
                let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
                if GENERIC_MIME_TYPES.contains(&essence.as_str()) {
                    Self::from_extension(file_name)
                } else {
                    None
                }
            }
            None => Self::from_extension(file_name),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ── Upload storage ───────────────────────────────────────────────────────────

/// An upload as received by an adapter.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as sent by the client; only its last component is kept.
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Validates uploads and writes them into the upload directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_file_size: u64,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.upload_dir.clone(), config.max_file_size)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Reject `size` if it is over the limit. Adapters call this while
    /// streaming so an oversized body is abandoned early.
    pub fn check_size(&self, size: u64) -> Result<(), Doc2PdfError> {
        if size > self.max_file_size {
            return Err(Doc2PdfError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Full validation of an upload's metadata.
    pub fn validate(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        size: u64,
    ) -> Result<DocumentKind, Doc2PdfError> {
        if size == 0 {
            return Err(Doc2PdfError::EmptyUpload {
                file_name: file_name.to_string(),
            });
        }
        self.check_size(size)?;
        DocumentKind::detect(file_name, content_type).ok_or_else(|| {
            Doc2PdfError::UnsupportedFileType {
                file_name: file_name.to_string(),
                content_type: content_type.unwrap_or("none").to_string(),
            }
        })
    }

    /// Where the upload for `id` is stored.
    pub fn path_for(&self, id: &TaskId, kind: DocumentKind) -> PathBuf {
        self.dir.join(format!("{}.{}", id, kind.extension()))
    }

    /// Write `bytes` to [`Self::path_for`] atomically and flush them to disk.
    pub async fn persist(
        &self,
        id: &TaskId,
        kind: DocumentKind,
        bytes: Vec<u8>,
    ) -> Result<PathBuf, Doc2PdfError> {
        let dest = self.path_for(id, kind);
        let dir = self.dir.clone();
        let target = dest.clone();
        run_blocking(move || {
            write_atomically(&dir, &target, |file| file.write_all(&bytes))
        })
        .await?;
        debug!("Stored upload {} at {}", id, dest.display());
        Ok(dest)
    }

    /// Copy a local file to [`Self::path_for`] atomically.
    pub async fn persist_file(
        &self,
        id: &TaskId,
        kind: DocumentKind,
        source: &Path,
    ) -> Result<PathBuf, Doc2PdfError> {
        let dest = self.path_for(id, kind);
        let dir = self.dir.clone();
        let target = dest.clone();
        let source = source.to_path_buf();
        run_blocking(move || {
            let mut input =
                std::fs::File::open(&source).map_err(|e| Doc2PdfError::storage(&source, e))?;
            write_atomically(&dir, &target, |file| {
                std::io::copy(&mut input, file).map(|_| ())
            })
        })
        .await?;
        debug!("Copied {} to {}", id, dest.display());
        Ok(dest)
    }

    /// Remove a stored upload whose task could not be registered.
    async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove orphaned upload {}: {}", path.display(), e);
        }
    }
}

async fn run_blocking<F>(f: F) -> Result<(), Doc2PdfError>
where
    F: FnOnce() -> Result<(), Doc2PdfError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Doc2PdfError::Internal(format!("upload writer task failed: {e}")))?
}

/// Temp file in `dir`, filled by `fill`, synced, then renamed onto `dest`.
/// The temp file is removed if any step fails.
fn write_atomically<F>(dir: &Path, dest: &Path, fill: F) -> Result<(), Doc2PdfError>
where
    F: FnOnce(&mut std::fs::File) -> std::io::Result<()>,
{
    std::fs::create_dir_all(dir).map_err(|e| Doc2PdfError::storage(dir, e))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".upload-")
        .tempfile_in(dir)
        .map_err(|e| Doc2PdfError::storage(dir, e))?;
    fill(tmp.as_file_mut()).map_err(|e| Doc2PdfError::storage(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Doc2PdfError::storage(tmp.path(), e))?;
    tmp.persist(dest)
        .map_err(|e| Doc2PdfError::storage(dest, e.error))?;
    Ok(())
}

/// Last path component of a client-supplied name, for display only.
fn display_name(file_name: &str) -> String {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Validate, store, register and queue an uploaded document.
///
/// Returns the task as registered (`received`); the worker picks it up in
/// the background.
pub async fn accept_upload(
    pipeline: &TaskPipeline,
    uploads: &UploadStore,
    upload: Upload,
) -> Result<ConversionTask, Doc2PdfError> {
    let original_name = display_name(&upload.file_name);
    let kind = uploads.validate(
        &original_name,
        upload.content_type.as_deref(),
        upload.bytes.len() as u64,
    )?;

    let id = TaskId::generate();
    let size = upload.bytes.len();
    let source_path = uploads.persist(&id, kind, upload.bytes).await?;
    let task = register(pipeline, uploads, id, original_name, source_path).await?;
    info!("Accepted upload '{}' ({} bytes, {}) as task {}", task.original_name, size, kind, task.id);
    Ok(task)
}

/// [`accept_upload`] for a file already on the local filesystem.
pub async fn accept_file(
    pipeline: &TaskPipeline,
    uploads: &UploadStore,
    path: &Path,
) -> Result<ConversionTask, Doc2PdfError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| Doc2PdfError::storage(path, e))?;
    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let kind = uploads.validate(&original_name, None, meta.len())?;

    let id = TaskId::generate();
    let source_path = uploads.persist_file(&id, kind, path).await?;
    let task = register(pipeline, uploads, id, original_name, source_path).await?;
    info!("Accepted {} as task {}", path.display(), task.id);
    Ok(task)
}

async fn register(
    pipeline: &TaskPipeline,
    uploads: &UploadStore,
    id: TaskId,
    original_name: String,
    source_path: PathBuf,
) -> Result<ConversionTask, Doc2PdfError> {
    match pipeline.submit(id.clone(), original_name, source_path.clone()) {
        Ok(task) => {
            pipeline.enqueue(id);
            Ok(task)
        }
        Err(e) => {
            uploads.discard(&source_path).await;
            Err(e)
        }
    }
}
