//! Error types for the doc2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Doc2PdfError`]: returned synchronously to whoever called into the
//!   library: unknown task, task in the wrong state, rejected upload, storage
//!   failure, bad configuration.
//!
//! * [`ConversionError`]: a single conversion failed. The worker never
//!   propagates it; its path-free `client_message` is recorded on the task
//!   as `error_detail` and the queue moves on to the next entry.

use crate::task::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`Doc2PdfError`], used by adapters to pick a
/// response (HTTP status, exit code) without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input rejected before a task exists.
    Validation,
    /// Unknown task identifier.
    NotFound,
    /// Operation attempted against a task not in the required state.
    InvalidState,
    /// Storage access failure.
    Io,
    /// Configuration or programming error.
    Internal,
}

/// All errors returned synchronously by the doc2pdf library.
///
/// Conversion failures use [`ConversionError`] and are recorded on the task
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum Doc2PdfError {
    // ── Task lookup / state ───────────────────────────────────────────────
    /// No task is registered under this identifier.
    #[error("Task '{id}' not found")]
    TaskNotFound { id: String },

    /// `create` was called with an identifier that is registered or was
    /// used by a task that has since been removed.
    #[error("Task id '{id}' is already in use")]
    DuplicateTask { id: TaskId },

    /// The identifier is empty, too long, or contains characters that are
    /// not safe in a file name.
    #[error("Invalid task id '{id}': use 1-128 ASCII letters, digits, '-' or '_'")]
    InvalidTaskId { id: String },

    /// The task exists but is not in the status the operation requires.
    #[error("Task '{id}' is {status}, expected {expected}")]
    InvalidState {
        id: TaskId,
        status: TaskStatus,
        expected: TaskStatus,
    },

    /// Cleanup was requested for a task that is still queued or converting.
    #[error("Task '{id}' is {status}; only converted or failed tasks can be cleaned up")]
    NotTerminal { id: TaskId, status: TaskStatus },

    // ── Upload validation ─────────────────────────────────────────────────
    /// Neither the MIME type nor the file extension names a supported document.
    #[error(
        "Unsupported file type '{content_type}' for '{file_name}'. \
Supported: .doc, .docx, .xls, .xlsx, .ppt, .pptx, .txt"
    )]
    UnsupportedFileType {
        file_name: String,
        content_type: String,
    },

    /// Upload exceeds the configured maximum size.
    #[error("File is {size} bytes; the maximum is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// Upload carried no bytes.
    #[error("Uploaded file '{file_name}' is empty")]
    EmptyUpload { file_name: String },

    // ── I/O ───────────────────────────────────────────────────────────────
    /// Reading or writing the upload/output directories failed.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config / runtime ──────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The pipeline was constructed outside a Tokio runtime.
    #[error("No Tokio runtime available: the pipeline must be created inside a runtime")]
    NoRuntime,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2PdfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Doc2PdfError::TaskNotFound { .. } => ErrorKind::NotFound,
            Doc2PdfError::InvalidState { .. } | Doc2PdfError::NotTerminal { .. } => {
                ErrorKind::InvalidState
            }
            Doc2PdfError::DuplicateTask { .. }
            | Doc2PdfError::InvalidTaskId { .. }
            | Doc2PdfError::UnsupportedFileType { .. }
            | Doc2PdfError::FileTooLarge { .. }
            | Doc2PdfError::EmptyUpload { .. } => ErrorKind::Validation,
            Doc2PdfError::Storage { .. } => ErrorKind::Io,
            Doc2PdfError::InvalidConfig(_)
            | Doc2PdfError::NoRuntime
            | Doc2PdfError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(id: impl Into<String>) -> Self {
        Doc2PdfError::TaskNotFound { id: id.into() }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Doc2PdfError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// What went wrong with a conversion, without the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceMissing,
    ConverterUnavailable,
    ProcessExit,
    Timeout,
    MissingOutput,
    Io,
    Crashed,
}

/// A failed conversion of one task.
///
/// The `Display` text carries full paths and goes to the logs. The task
/// records [`ConversionError::client_message`] instead, which is what API
/// clients see. The pipeline keeps draining the queue either way.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ConversionError {
    /// The stored upload was not found when the conversion started.
    #[error("Source file not found: '{path}'")]
    SourceMissing { path: PathBuf },

    /// The converter executable could not be started.
    #[error("Converter '{binary}' could not be started: {detail}")]
    ConverterUnavailable { binary: String, detail: String },

    /// The converter exited with a non-zero status (`None` when killed by a signal).
    #[error("Converter exited with {}: {stderr}", describe_exit(*code))]
    ProcessFailed { code: Option<i32>, stderr: String },

    /// The converter did not finish in time and was killed.
    #[error("Converter timed out after {after:?}")]
    Timeout { after: Duration },

    /// The converter reported success but the PDF is not where it must be.
    #[error("Converter exited successfully but produced no PDF at '{path}'")]
    MissingOutput { path: PathBuf },

    /// Preparing the output directory or moving the result failed.
    #[error("I/O error during conversion: {detail}")]
    Io { detail: String },

    /// The conversion task panicked or was aborted.
    #[error("Conversion crashed: {detail}")]
    Crashed { detail: String },
}

impl ConversionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ConversionError::SourceMissing { .. } => FailureKind::SourceMissing,
            ConversionError::ConverterUnavailable { .. } => FailureKind::ConverterUnavailable,
            ConversionError::ProcessFailed { .. } => FailureKind::ProcessExit,
            ConversionError::Timeout { .. } => FailureKind::Timeout,
            ConversionError::MissingOutput { .. } => FailureKind::MissingOutput,
            ConversionError::Io { .. } => FailureKind::Io,
            ConversionError::Crashed { .. } => FailureKind::Crashed,
        }
    }

    /// The `Display` text with every filesystem path cut down to its last
    /// component, so it can be shown to whoever uploaded the document.
    pub fn client_message(&self) -> String {
        strip_directories(&self.to_string())
    }
}

/// Replace each whitespace-separated word that contains a path separator
/// with its final component, keeping leading quotes and brackets.
fn strip_directories(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for segment in text.split_inclusive(char::is_whitespace) {
        let word = segment.trim_end();
        let trailing = &segment[word.len()..];
        match word.rfind(['/', '\\']) {
            Some(last) => {
                let opener_len = word.len() - word.trim_start_matches(['\'', '"', '(', '[', '<']).len();
                out.push_str(&word[..opener_len]);
                out.push_str(&word[last + 1..]);
            }
            None => out.push_str(word),
        }
        out.push_str(trailing);
    }
    out
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (terminated by signal)".to_string(),
    }
}
