//! Integration tests for the LibreOffice converter.
//!
//! A real LibreOffice is not required: `/bin/sh` is configured as the
//! converter binary and a small script (passed as an extra argument) plays
//! its part. The script sees the usual command line:
//!
//! ```text
//! $1 --headless  $2 --convert-to  $3 pdf  $4 --outdir  $5 <dir>  $6 <source>
//! ```

#![cfg(unix)]

use doc2pdf::{
    ConversionError, ConversionRequest, Converter, PipelineConfig, SofficeConverter, TaskId,
    TaskPipeline, TaskStatus,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Writes `<outdir>/<source stem>.pdf`, as LibreOffice does.
const CONVERT_OK: &str = r#"
out="$5"
name=$(basename "$6")
printf '%%PDF-1.4\n%%fake\n' > "$out/${name%.*}.pdf"
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\nset -e\n{body}\n")).unwrap();
    path
}

fn converter(script: &Path) -> SofficeConverter {
    SofficeConverter::new("/bin/sh")
        .with_args(vec![script.display().to_string()])
        .with_timeout(Duration::from_secs(10))
}

fn request(dir: &Path, id: &str, source_name: &str) -> ConversionRequest {
    let source = dir.join("uploads").join(source_name);
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, b"PK\x03\x04").unwrap();
    ConversionRequest::new(TaskId::new(id).unwrap(), source, dir.join("output"))
}

// ── Converter ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_success_writes_task_named_pdf() {
    let tmp = tempfile::tempdir().unwrap();
    let conv = converter(&script(tmp.path(), "ok.sh", CONVERT_OK));
    let req = request(tmp.path(), "t1", "t1.docx");

    let out = conv.convert(&req).await.unwrap();
    assert_eq!(out, tmp.path().join("output/t1.pdf"));
    assert!(std::fs::read(&out).unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_output_named_after_source_is_renamed() {
    let tmp = tempfile::tempdir().unwrap();
    let conv = converter(&script(tmp.path(), "ok.sh", CONVERT_OK));
    let req = request(tmp.path(), "t9", "report.docx");

    let out = conv.convert(&req).await.unwrap();
    assert_eq!(out, tmp.path().join("output/t9.pdf"));
    assert!(out.exists());
    assert!(!tmp.path().join("output/report.pdf").exists());
}

#[tokio::test]
async fn test_nonzero_exit_reports_code_and_stderr() {
    let tmp = tempfile::tempdir().unwrap();
    let conv = converter(&script(
        tmp.path(),
        "fail.sh",
        "echo 'Error: source file could not be loaded' >&2\nexit 77",
    ));
    let req = request(tmp.path(), "t2", "t2.docx");

    match conv.convert(&req).await.unwrap_err() {
        ConversionError::ProcessFailed { code, stderr } => {
            assert_eq!(code, Some(77));
            assert!(stderr.contains("could not be loaded"), "got: {stderr}");
        }
        other => panic!("expected ProcessFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_clean_exit_without_pdf_is_missing_output() {
    let tmp = tempfile::tempdir().unwrap();
    let conv = converter(&script(tmp.path(), "noop.sh", "exit 0"));
    let req = request(tmp.path(), "t3", "t3.docx");

    let err = conv.convert(&req).await.unwrap_err();
    assert!(
        matches!(err, ConversionError::MissingOutput { ref path } if path.ends_with("t3.pdf")),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_empty_pdf_is_missing_output() {
    let tmp = tempfile::tempdir().unwrap();
    let conv = converter(&script(tmp.path(), "empty.sh", r#": > "$5/t4.pdf""#));
    let req = request(tmp.path(), "t4", "t4.docx");

    let err = conv.convert(&req).await.unwrap_err();
    assert!(matches!(err, ConversionError::MissingOutput { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_stale_pdf_is_not_reported_as_success() {
    let tmp = tempfile::tempdir().unwrap();
    let conv = converter(&script(tmp.path(), "noop.sh", "exit 0"));
    let req = request(tmp.path(), "t5", "t5.docx");
    std::fs::create_dir_all(tmp.path().join("output")).unwrap();
    std::fs::write(tmp.path().join("output/t5.pdf"), b"%PDF-old").unwrap();

    let err = conv.convert(&req).await.unwrap_err();
    assert!(matches!(err, ConversionError::MissingOutput { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_hung_converter_times_out() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let conv = converter(&script(tmp.path(), "hang.sh", "exec sleep 5"))
        .with_timeout(Duration::from_millis(300));
    let req = request(tmp.path(), "t6", "t6.docx");

    let start = Instant::now();
    let err = conv.convert(&req).await.unwrap_err();
    assert_eq!(
        err,
        ConversionError::Timeout {
            after: Duration::from_millis(300)
        }
    );
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_missing_binary_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let conv = SofficeConverter::new(tmp.path().join("no-such-soffice"));
    let req = request(tmp.path(), "t7", "t7.docx");

    let err = conv.convert(&req).await.unwrap_err();
    assert!(
        matches!(err, ConversionError::ConverterUnavailable { .. }),
        "got {err:?}"
    );
}

// ── Through the pipeline ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_pipeline_runs_converter_processes_one_at_a_time() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("calls.log");
    let body = format!(
        r#"
echo "start $6" >> "{log}"
sleep 0.05
out="$5"
name=$(basename "$6")
printf '%%PDF-1.4\n' > "$out/${{name%.*}}.pdf"
echo "end $6" >> "{log}"
"#,
        log = log.display()
    );
    let script = script(tmp.path(), "logged.sh", &body);

    let config = PipelineConfig::builder()
        .converter_path("/bin/sh")
        .converter_args([script.display().to_string()])
        .upload_dir(tmp.path().join("uploads"))
        .output_dir(tmp.path().join("output"))
        .convert_timeout_secs(10)
        .build()
        .unwrap();
    config.ensure_directories().await.unwrap();
    let pipeline = TaskPipeline::new(&config).unwrap();

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let source = config.upload_dir.join(format!("{name}.txt"));
        std::fs::write(&source, b"hello").unwrap();
        let id = TaskId::new(name).unwrap();
        pipeline.submit(id.clone(), format!("{name}.txt"), source).unwrap();
        pipeline.enqueue(id.clone());
        ids.push(id);
    }
    tokio::time::timeout(Duration::from_secs(20), pipeline.wait_idle())
        .await
        .expect("pipeline did not go idle");

    for id in &ids {
        let task = pipeline.get_task(id).unwrap();
        assert_eq!(task.status, TaskStatus::Converted, "{id}: {:?}", task.error_detail);
        assert_eq!(task.output_path, Some(config.output_dir.join(format!("{id}.pdf"))));
    }

    // every start is followed by its own end before the next start
    let lines: Vec<String> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|l| l.split_whitespace().next().unwrap().to_string())
        .collect();
    assert_eq!(lines, ["start", "end", "start", "end", "start", "end"]);
}
