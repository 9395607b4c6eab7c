//! Converter invocation: turn a stored upload into `<task-id>.pdf`.
//!
//! The [`Converter`] trait is the seam between the pipeline worker and the
//! external renderer. [`SofficeConverter`] is the production implementation;
//! tests substitute a fake that returns canned outcomes.
//!
//! ## Trust model
//!
//! The external process is opaque. Its stdout/stderr are captured for
//! diagnostics only. Success requires **both** a zero exit status **and** a
//! non-empty PDF at the expected path: LibreOffice exits 0 when it cannot load
//! the source, it just writes nothing.
//!
//! ## Naming
//!
//! LibreOffice names its output after the input's file stem. Uploads are
//! stored as `<task-id>.<ext>`, so the PDF normally lands at
//! `<output_dir>/<task-id>.pdf` directly; if the source is named differently
//! the result is renamed there. Stale files at either path are removed before
//! the run so a leftover from an earlier attempt can never pass the artifact
//! check.
//!
//! No retry happens here; one call is one attempt.

use crate::config::PipelineConfig;
use crate::error::ConversionError;
use crate::task::TaskId;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How much converter stderr is kept in an error message.
const MAX_STDERR_BYTES: usize = 2048;

/// One conversion: which task, which file, and where the PDF goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub task_id: TaskId,
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
}

impl ConversionRequest {
    pub fn new(task_id: TaskId, source_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            task_id,
            source_path: source_path.into(),
            output_dir: output_dir.into(),
        }
    }

    /// `<output_dir>/<task-id>.pdf`, the only path a successful conversion may report.
    pub fn output_path(&self) -> PathBuf {
        output_path_for(&self.output_dir, &self.task_id)
    }
}

/// The PDF location for `id` under `output_dir`.
pub fn output_path_for(output_dir: &Path, id: &TaskId) -> PathBuf {
    output_dir.join(format!("{id}.pdf"))
}

/// Renders one document to PDF.
///
/// Implementations are called by a single worker, one request at a time.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `request.source_path` and return the path of the produced PDF,
    /// which must equal [`ConversionRequest::output_path`].
    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConversionError>;
}

/// Runs LibreOffice (`soffice --headless --convert-to pdf`) as a child process.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    binary: PathBuf,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(crate::config::DEFAULT_CONVERT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.converter_path)
            .with_args(config.converter_args.clone())
            .with_timeout(config.convert_timeout)
    }

    /// Arguments placed before `--headless --convert-to pdf ...`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, request: &ConversionRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.extra_args)
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(&request.output_dir)
            .arg(&request.source_path)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Converter for SofficeConverter {
    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConversionError> {
        let source = &request.source_path;
        if !is_file(source).await {
            return Err(ConversionError::SourceMissing {
                path: source.clone(),
            });
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| io_error("create output directory", &request.output_dir, e))?;

        let expected = request.output_path();
        let produced = produced_path(request);
        remove_stale(&expected).await?;
        if produced != expected {
            remove_stale(&produced).await?;
        }

        debug!(
            "Running {} {:?} --headless --convert-to pdf --outdir {} {}",
            self.binary.display(),
            self.extra_args,
            request.output_dir.display(),
            source.display()
        );

        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout, self.command(request).output()).await {
            Err(_) => {
                warn!(
                    "Task {}: converter timed out after {:?}, killed",
                    request.task_id, self.timeout
                );
                return Err(ConversionError::Timeout {
                    after: self.timeout,
                });
            }
            Ok(Err(e)) => {
                return Err(ConversionError::ConverterUnavailable {
                    binary: self.binary.display().to_string(),
                    detail: e.to_string(),
                });
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("Task {}: converter stdout: {}", request.task_id, stdout.trim());
        }

        if !output.status.success() {
            return Err(ConversionError::ProcessFailed {
                code: output.status.code(),
                stderr: tail(stderr.trim(), MAX_STDERR_BYTES).to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            debug!("Task {}: converter stderr: {}", request.task_id, stderr.trim());
        }

        if produced != expected && is_file(&produced).await {
            tokio::fs::rename(&produced, &expected)
                .await
                .map_err(|e| io_error("move converter output", &produced, e))?;
        }

        match tokio::fs::metadata(&expected).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                info!(
                    "Task {}: rendered {} ({} bytes) in {}ms",
                    request.task_id,
                    expected.display(),
                    meta.len(),
                    start.elapsed().as_millis()
                );
                Ok(expected)
            }
            _ => Err(ConversionError::MissingOutput { path: expected }),
        }
    }
}

/// Where LibreOffice itself writes the PDF: `<output_dir>/<source stem>.pdf`.
fn produced_path(request: &ConversionRequest) -> PathBuf {
    match request.source_path.file_stem() {
        Some(stem) => {
            let mut name = stem.to_os_string();
            name.push(".pdf");
            request.output_dir.join(name)
        }
        None => request.output_path(),
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn remove_stale(path: &Path) -> Result<(), ConversionError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed stale output {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("remove stale output", path, e)),
    }
}

fn io_error(action: &str, path: &Path, e: io::Error) -> ConversionError {
    ConversionError::Io {
        detail: format!("{action} '{}': {e}", path.display()),
    }
}

/// The last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
