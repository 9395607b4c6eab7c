//! The conversion task pipeline: task registry, FIFO queue, single worker.
//!
//! ## Data Flow
//!
//! ```text
//! submit ──▶ TaskStore (received)
//! enqueue ──▶ WorkQueue ──(arm if idle)──▶ worker::drain
//!                                            │  pop head
//!                                            ├─ Start      received → converting
//!                                            ├─ Converter  external process, bounded by timeout
//!                                            └─ Complete / Fail
//! ```
//!
//! 1. [`queue`]: the FIFO and the armed flag, under one lock
//! 2. [`worker`]: the drain loop; one instance at a time, spawned by `enqueue`
//!
//! At most one conversion runs at any moment, system-wide. `enqueue` never
//! waits for a conversion; it appends, arms the worker if it was idle, and
//! returns.

pub mod queue;
mod worker;

pub use queue::QueueStatus;

use crate::config::PipelineConfig;
use crate::converter::{Converter, SofficeConverter};
use crate::error::Doc2PdfError;
use crate::observer::SharedObserver;
use crate::store::{MemoryTaskStore, TaskStore};
use crate::task::{ConversionTask, TaskId, TaskStatus};
use queue::{Push, WorkQueue};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// State shared by the pipeline handle and the worker.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) converter: Arc<dyn Converter>,
    pub(crate) queue: WorkQueue,
    pub(crate) output_dir: PathBuf,
    pub(crate) observer: Option<SharedObserver>,
    pub(crate) runtime: Handle,
}

/// Handle to the conversion pipeline. Cheap to clone; all clones share one
/// store, one queue and one worker.
#[derive(Clone)]
pub struct TaskPipeline {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TaskPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPipeline")
            .field("output_dir", &self.shared.output_dir)
            .field("queue", &self.shared.queue.status())
            .finish()
    }
}

impl TaskPipeline {
    /// Pipeline with an in-memory store and the LibreOffice converter.
    ///
    /// Must be called inside a Tokio runtime; the worker is spawned onto it.
    pub fn new(config: &PipelineConfig) -> Result<Self, Doc2PdfError> {
        Self::with_parts(
            config,
            Arc::new(MemoryTaskStore::new()),
            Arc::new(SofficeConverter::from_config(config)),
        )
    }

    /// Pipeline with a caller-supplied store and converter.
    pub fn with_parts(
        config: &PipelineConfig,
        store: Arc<dyn TaskStore>,
        converter: Arc<dyn Converter>,
    ) -> Result<Self, Doc2PdfError> {
        let runtime = Handle::try_current().map_err(|_| Doc2PdfError::NoRuntime)?;
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                converter,
                queue: WorkQueue::new(),
                output_dir: config.output_dir.clone(),
                observer: config.observer.clone(),
                runtime,
            }),
        })
    }

    /// Start tracking a stored upload. The task begins in `received`.
    ///
    /// `source_path` must already be durably written.
    pub fn submit(
        &self,
        id: TaskId,
        original_name: impl Into<String>,
        source_path: impl Into<PathBuf>,
    ) -> Result<ConversionTask, Doc2PdfError> {
        let task = self
            .shared
            .store
            .create(id, original_name.into(), source_path.into())?;
        info!(
            "Task {} submitted: '{}' at {}",
            task.id,
            task.original_name,
            task.source_path.display()
        );
        Ok(task)
    }

    /// Append `id` to the queue and start the worker if it is idle.
    ///
    /// Returns immediately. Unknown or non-`received` ids are not rejected
    /// here; the worker skips them. An id that is already waiting is not
    /// queued twice.
    pub fn enqueue(&self, id: TaskId) {
        let label = id.to_string();
        match self.shared.queue.push(id.clone()) {
            Push::Armed { pending } => {
                info!("Task {} queued ({} pending), starting worker", label, pending);
                self.notify_queued(&id, pending);
                let shared = Arc::clone(&self.shared);
                self.shared.runtime.spawn(worker::drain(shared));
            }
            Push::Appended { pending } => {
                info!("Task {} queued ({} pending)", label, pending);
                self.notify_queued(&id, pending);
            }
            Push::Duplicate => {
                debug!("Task {} is already queued", label);
            }
        }
    }

    /// Queue a task after checking it exists and is still `received`.
    pub fn start(&self, id: &TaskId) -> Result<ConversionTask, Doc2PdfError> {
        let task = self.get_task(id)?;
        if task.status != TaskStatus::Received {
            return Err(Doc2PdfError::InvalidState {
                id: task.id,
                status: task.status,
                expected: TaskStatus::Received,
            });
        }
        self.enqueue(id.clone());
        Ok(task)
    }

    /// Snapshot of one task, or [`Doc2PdfError::TaskNotFound`].
    pub fn get_task(&self, id: &TaskId) -> Result<ConversionTask, Doc2PdfError> {
        self.shared
            .store
            .get(id)
            .ok_or_else(|| Doc2PdfError::not_found(id.as_str()))
    }

    /// Look up a task by an untrusted identifier string (e.g. a URL segment).
    /// Malformed identifiers cannot name a task and are reported as not found.
    pub fn find(&self, raw_id: &str) -> Result<ConversionTask, Doc2PdfError> {
        let id = TaskId::new(raw_id).map_err(|_| Doc2PdfError::not_found(raw_id))?;
        self.get_task(&id)
    }

    /// Every task, oldest first.
    pub fn tasks(&self) -> Vec<ConversionTask> {
        self.shared.store.list()
    }

    /// Current queue length and worker state.
    pub fn queue_status(&self) -> QueueStatus {
        self.shared.queue.status()
    }

    /// Resolve once the queue is empty and no conversion is running.
    pub async fn wait_idle(&self) {
        self.shared.queue.wait_idle().await
    }

    /// Delete a finished task's files and then its record.
    ///
    /// Only `converted` and `failed` tasks can be cleaned up. Files that are
    /// already gone are ignored.
    pub async fn cleanup(&self, id: &TaskId) -> Result<ConversionTask, Doc2PdfError> {
        let task = self.get_task(id)?;
        if !task.is_terminal() {
            return Err(Doc2PdfError::NotTerminal {
                id: task.id,
                status: task.status,
            });
        }

        remove_if_present(&task.source_path).await?;
        if let Some(ref output) = task.output_path {
            remove_if_present(output).await?;
        }
        self.shared.store.remove(id);
        info!("Task {} cleaned up", id);
        Ok(task)
    }

    /// Directory receiving `<id>.pdf` files.
    pub fn output_dir(&self) -> &Path {
        &self.shared.output_dir
    }

    fn notify_queued(&self, id: &TaskId, pending: usize) {
        if let Some(obs) = &self.shared.observer {
            obs.on_task_queued(id, pending);
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<(), Doc2PdfError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Doc2PdfError::storage(path, e)),
    }
}
