//! Observer trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as the
//! worker drains the queue. The CLI uses it to drive a progress bar; tests use
//! it to record the order and overlap of conversions.
//!
//! # Example
//!
//! ```rust
//! use doc2pdf::{PipelineConfig, PipelineObserver, TaskId};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//! use std::time::Duration;
//!
//! struct CountingObserver {
//!     converted: AtomicUsize,
//! }
//!
//! impl PipelineObserver for CountingObserver {
//!     fn on_task_converted(&self, id: &TaskId, output: &Path, elapsed: Duration) {
//!         let done = self.converted.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{id} -> {} in {elapsed:?} ({done} so far)", output.display());
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { converted: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .observer(observer as Arc<dyn PipelineObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ConversionError;
use crate::task::TaskId;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Called by the pipeline as tasks move through the queue.
///
/// `on_task_queued` runs on the caller of `enqueue`; every other method runs
/// on the worker. Methods are called synchronously, so keep them short. All
/// methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    /// An identifier was appended to the queue.
    ///
    /// # Arguments
    /// * `pending`: queue length after the append
    fn on_task_queued(&self, id: &TaskId, pending: usize) {
        let _ = (id, pending);
    }

    /// The worker moved the task to `converting` and is about to call the converter.
    fn on_task_started(&self, id: &TaskId) {
        let _ = id;
    }

    /// The task reached `converted`.
    fn on_task_converted(&self, id: &TaskId, output_path: &Path, elapsed: Duration) {
        let _ = (id, output_path, elapsed);
    }

    /// The task reached `failed`.
    fn on_task_failed(&self, id: &TaskId, error: &ConversionError) {
        let _ = (id, error);
    }

    /// A dequeued identifier was unknown or no longer `received`.
    fn on_task_skipped(&self, id: &TaskId, reason: &str) {
        let _ = (id, reason);
    }

    /// The queue drained and the worker went idle.
    ///
    /// Advisory: it is delivered after the queue lock is released, so an
    /// `enqueue` racing it may already have armed the next worker. Use
    /// [`TaskPipeline::queue_status`](crate::TaskPipeline::queue_status) for
    /// the current state.
    fn on_queue_idle(&self) {}
}

/// An observer that ignores every event.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type SharedObserver = Arc<dyn PipelineObserver>;
