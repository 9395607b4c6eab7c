//! Configuration for the conversion pipeline.
//!
//! Everything the pipeline needs from its surroundings (the converter
//! executable, the two storage directories, the timeout, the upload limit) is
//! supplied once at startup through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`].

use crate::error::Doc2PdfError;
use crate::observer::SharedObserver;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default upload limit: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Default converter timeout in seconds.
pub const DEFAULT_CONVERT_TIMEOUT_SECS: u64 = 120;

/// Configuration for a [`crate::TaskPipeline`] and its upload storage.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use doc2pdf::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .converter_path("/usr/bin/soffice")
///     .output_dir("/var/lib/doc2pdf/output")
///     .convert_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// External converter executable. Default: `soffice` (resolved via `PATH`).
    pub converter_path: PathBuf,

    /// Extra arguments placed before the standard conversion arguments,
    /// e.g. `-env:UserInstallation=file:///tmp/lo-profile`. Default: none.
    pub converter_args: Vec<String>,

    /// Directory holding raw uploads, `<id>.<ext>`. Default: `./uploads`.
    pub upload_dir: PathBuf,

    /// Directory receiving rendered PDFs, `<id>.pdf`. Default: `./output`.
    pub output_dir: PathBuf,

    /// Upper bound on one converter run. Default: 120 s.
    ///
    /// LibreOffice can hang on malformed input or a stale profile lock; the
    /// process is killed and the task marked failed when this elapses.
    pub convert_timeout: Duration,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_file_size: u64,

    /// Receives queue and conversion events. Default: none.
    pub observer: Option<SharedObserver>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            converter_path: PathBuf::from("soffice"),
            converter_args: Vec::new(),
            upload_dir: PathBuf::from("./uploads"),
            output_dir: PathBuf::from("./output"),
            convert_timeout: Duration::from_secs(DEFAULT_CONVERT_TIMEOUT_SECS),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("converter_path", &self.converter_path)
            .field("converter_args", &self.converter_args)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("convert_timeout", &self.convert_timeout)
            .field("max_file_size", &self.max_file_size)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Create the upload and output directories if they do not exist.
    pub async fn ensure_directories(&self) -> Result<(), Doc2PdfError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            create_dir(dir).await?;
        }
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> Result<(), Doc2PdfError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Doc2PdfError::storage(dir, e))?;
    debug!("Directory ready: {}", dir.display());
    Ok(())
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn converter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.converter_path = path.into();
        self
    }

    pub fn converter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.converter_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn convert_timeout(mut self, timeout: Duration) -> Self {
        self.config.convert_timeout = timeout;
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout = Duration::from_secs(secs);
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Doc2PdfError> {
        let c = &self.config;
        if c.converter_path.as_os_str().is_empty() {
            return Err(Doc2PdfError::InvalidConfig(
                "Converter path must not be empty".into(),
            ));
        }
        if c.convert_timeout.is_zero() {
            return Err(Doc2PdfError::InvalidConfig(
                "Convert timeout must be > 0".into(),
            ));
        }
        if c.max_file_size == 0 {
            return Err(Doc2PdfError::InvalidConfig(
                "Max file size must be > 0".into(),
            ));
        }
        if c.upload_dir == c.output_dir {
            return Err(Doc2PdfError::InvalidConfig(format!(
                "Upload and output directories must differ (both are {})",
                c.upload_dir.display()
            )));
        }
        Ok(self.config)
    }
}
