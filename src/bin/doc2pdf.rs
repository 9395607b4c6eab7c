//! CLI binary for doc2pdf.
//!
//! `serve` runs the HTTP service; `convert` pushes local files through the
//! same single-worker pipeline and reports the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc2pdf::server::{self, AppState};
use doc2pdf::{
    accept_file, ConversionError, PipelineConfig, PipelineObserver, SharedObserver, TaskId,
    TaskPipeline, TaskStatus, UploadStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress observer ────────────────────────────────────────────────────────

/// Progress bar over the batch, one log line per finished document.
struct CliObserver {
    bar: ProgressBar,
    /// Task id → input file name, for log lines.
    names: Mutex<HashMap<TaskId, String>>,
}

impl CliObserver {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            names: Mutex::new(HashMap::new()),
        })
    }

    fn remember(&self, id: &TaskId, input: &Path) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), input.display().to_string());
    }

    fn name(&self, id: &TaskId) -> String {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn rejected(&self, input: &Path, reason: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            input.display(),
            red(&truncate(reason, 80))
        ));
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineObserver for CliObserver {
    fn on_task_started(&self, id: &TaskId) {
        self.bar.set_message(self.name(id));
    }

    fn on_task_converted(&self, id: &TaskId, output_path: &Path, elapsed: Duration) {
        self.bar.println(format!(
            "  {} {}  →  {}  {}",
            green("✓"),
            self.name(id),
            output_path.display(),
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
        self.bar.inc(1);
    }

    fn on_task_failed(&self, id: &TaskId, error: &ConversionError) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            self.name(id),
            red(&truncate(&error.to_string(), 80)),
        ));
        self.bar.inc(1);
    }

    fn on_task_skipped(&self, id: &TaskId, reason: &str) {
        self.bar
            .println(format!("  {} {}  {}", dim("-"), self.name(id), dim(reason)));
        self.bar.inc(1);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── CLI ──────────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 8080
  doc2pdf serve --port 8080

  # Serve a web front-end from ./public as well
  doc2pdf serve --static-dir ./public

  # Convert local files, PDFs land in ./output
  doc2pdf convert report.docx budget.xlsx slides.pptx

  # Use a specific LibreOffice and a private profile directory
  doc2pdf convert --converter /opt/libreoffice/program/soffice \
      --converter-arg=-env:UserInstallation=file:///tmp/lo-profile report.doc

  # Machine-readable summary
  doc2pdf convert --json *.docx > summary.json

SUPPORTED FORMATS:
  .doc .docx .xls .xlsx .ppt .pptx .txt

ENVIRONMENT VARIABLES:
  DOC2PDF_BIND        Listen address (default 0.0.0.0:3000)
  PORT                Overrides the port of DOC2PDF_BIND
  UPLOAD_DIR          Where uploads are stored (default ./uploads)
  OUTPUT_DIR          Where PDFs are written (default ./output)
  MAX_FILE_SIZE       Upload limit in bytes (default 52428800)
  LIBREOFFICE_PATH    Converter executable (default soffice)
  DOC2PDF_TIMEOUT     Per-conversion timeout in seconds (default 120)
  DOC2PDF_STATIC_DIR  Directory served for unmatched paths
  DOC2PDF_LOG_JSON    Emit JSON log lines
  RUST_LOG            Log filter, overrides --verbose/--quiet
"#;

/// Convert office documents to PDF with LibreOffice, one at a time.
#[derive(Parser, Debug)]
#[command(
    name = "doc2pdf",
    version,
    about = "Convert office documents to PDF with LibreOffice, one at a time",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOC2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOC2PDF_QUIET")]
    quiet: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "DOC2PDF_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP conversion service.
    Serve {
        /// Listen address.
        #[arg(long, env = "DOC2PDF_BIND", default_value = "0.0.0.0:3000")]
        bind: String,

        /// Port, replacing the one in --bind.
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Serve files from this directory for unmatched paths.
        #[arg(long, env = "DOC2PDF_STATIC_DIR")]
        static_dir: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Convert local files and exit.
    Convert {
        /// Documents to convert.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print a JSON summary on stdout.
        #[arg(long)]
        json: bool,

        /// Disable the progress bar.
        #[arg(long, env = "DOC2PDF_NO_PROGRESS")]
        no_progress: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// LibreOffice executable.
    #[arg(long, env = "LIBREOFFICE_PATH", default_value = "soffice")]
    converter: PathBuf,

    /// Extra argument passed to the converter before the standard ones (repeatable).
    #[arg(long = "converter-arg", allow_hyphen_values = true)]
    converter_args: Vec<String>,

    /// Where uploads are stored. `convert` uses a temporary directory when unset.
    #[arg(long, env = "UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Where PDFs are written.
    #[arg(long, env = "OUTPUT_DIR", default_value = "./output")]
    output_dir: PathBuf,

    /// Per-conversion timeout in seconds.
    #[arg(long, env = "DOC2PDF_TIMEOUT", default_value_t = doc2pdf::config::DEFAULT_CONVERT_TIMEOUT_SECS)]
    timeout: u64,

    /// Largest accepted file in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = doc2pdf::config::DEFAULT_MAX_FILE_SIZE)]
    max_file_size: u64,
}

impl PipelineArgs {
    fn build(&self, upload_dir: PathBuf, observer: Option<SharedObserver>) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder()
            .converter_path(&self.converter)
            .converter_args(self.converter_args.iter().cloned())
            .upload_dir(upload_dir)
            .output_dir(&self.output_dir)
            .convert_timeout_secs(self.timeout)
            .max_file_size(self.max_file_size);
        if let Some(obs) = observer {
            builder = builder.observer(obs);
        }
        builder.build().context("Invalid configuration")
    }
}

/// One line of the `convert` summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSummary {
    input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FileSummary {
    fn succeeded(&self) -> bool {
        self.status == TaskStatus::Converted.as_str()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs in `convert`.
    let progress_active = matches!(
        &cli.command,
        Command::Convert { json, no_progress, .. } if !*json && !*no_progress
    ) && !cli.quiet;
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if progress_active {
        "error"
    } else {
        "info"
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Command::Serve {
            bind,
            port,
            static_dir,
            pipeline,
        } => run_serve(bind, port, static_dir, pipeline).await,
        Command::Convert {
            files,
            json,
            pipeline,
            ..
        } => run_convert(files, json, progress_active, cli.quiet, pipeline).await,
    }
}

async fn run_serve(
    bind: String,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
    args: PipelineArgs,
) -> Result<()> {
    let upload_dir = args
        .upload_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./uploads"));
    let config = args.build(upload_dir, None)?;
    config
        .ensure_directories()
        .await
        .context("Failed to create upload/output directories")?;

    let mut addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid listen address '{bind}'"))?;
    if let Some(port) = port {
        addr.set_port(port);
    }

    let pipeline = TaskPipeline::new(&config).context("Failed to start pipeline")?;
    let mut state = AppState::new(pipeline, UploadStore::from_config(&config));
    if let Some(dir) = static_dir {
        state = state.with_static_dir(dir);
    }

    server::serve(addr, Arc::new(state), server::shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn run_convert(
    files: Vec<PathBuf>,
    json: bool,
    show_progress: bool,
    quiet: bool,
    args: PipelineArgs,
) -> Result<()> {
    // Staged copies live in a scratch directory unless the caller asked to keep them.
    let (upload_dir, _scratch) = match &args.upload_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let tmp = tempfile::tempdir().context("Failed to create staging directory")?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };

    let observer = show_progress.then(|| CliObserver::new(files.len()));
    let config = args.build(
        upload_dir,
        observer.clone().map(|o| o as SharedObserver),
    )?;
    config
        .ensure_directories()
        .await
        .context("Failed to create upload/output directories")?;

    let pipeline = TaskPipeline::new(&config).context("Failed to start pipeline")?;
    let uploads = UploadStore::from_config(&config);

    let mut accepted: Vec<(PathBuf, TaskId)> = Vec::new();
    let mut summary: Vec<FileSummary> = Vec::new();
    for file in &files {
        match accept_file(&pipeline, &uploads, file).await {
            Ok(task) => {
                if let Some(obs) = &observer {
                    obs.remember(&task.id, file);
                }
                accepted.push((file.clone(), task.id));
            }
            Err(e) => {
                warn!("Rejected {}: {}", file.display(), e);
                if let Some(obs) = &observer {
                    obs.rejected(file, &e.to_string());
                }
                summary.push(FileSummary {
                    input: file.clone(),
                    task_id: None,
                    status: "rejected".to_string(),
                    output: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    pipeline.wait_idle().await;
    if let Some(obs) = &observer {
        obs.finish();
    }

    for (input, id) in accepted {
        let task = pipeline.get_task(&id)?;
        summary.push(FileSummary {
            input,
            task_id: Some(id.to_string()),
            status: task.status.to_string(),
            output: task.output_path,
            error: task.error_detail,
        });
    }

    let total = summary.len();
    let failed = summary.iter().filter(|s| !s.succeeded()).count();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !quiet {
        if !show_progress {
            for s in &summary {
                match (&s.output, &s.error) {
                    (Some(out), _) => eprintln!("{} -> {}", s.input.display(), out.display()),
                    (None, Some(err)) => eprintln!("{}: {}", s.input.display(), err),
                    (None, None) => eprintln!("{}: {}", s.input.display(), s.status),
                }
            }
        }
        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted  →  {}",
                green("✔"),
                bold(&total.to_string()),
                bold(&config.output_dir.display().to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                red("✘"),
                bold(&(total - failed).to_string()),
                total,
                red(&failed.to_string())
            );
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} file(s) could not be converted");
    }
    Ok(())
}
