//! Task types: the identifier, the status state machine, and the task record.
//!
//! A [`ConversionTask`] only changes through [`ConversionTask::apply`], which
//! accepts a [`Transition`] and rejects anything the state machine forbids:
//!
//! ```text
//! received ──Start──▶ converting ──Complete──▶ converted
//!                          │
//!                          └────────Fail─────▶ failed
//! ```
//!
//! Each transition carries exactly the fields its target state needs, so the
//! `output_path` ⇔ `converted` and `error_detail` ⇔ `failed` pairing holds by
//! construction rather than by convention.

use crate::error::Doc2PdfError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Longest identifier accepted by [`TaskId::new`].
pub const MAX_TASK_ID_LEN: usize = 128;

/// Opaque task identifier.
///
/// Identifiers become file names (`<id>.<ext>`, `<id>.pdf`), so only ASCII
/// alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Validate and wrap a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, Doc2PdfError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_TASK_ID_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(id))
        } else {
            Err(Doc2PdfError::InvalidTaskId { id })
        }
    }

    /// A fresh random (UUIDv4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TaskId {
    type Error = Doc2PdfError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TaskId::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Where a task sits in the conversion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Stored and waiting for the worker. The only initial state.
    Received,
    /// The worker is running the external converter for this task.
    Converting,
    /// Terminal: the PDF exists at `output_path`.
    Converted,
    /// Terminal: `error_detail` says why.
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Converted | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Received => "received",
            TaskStatus::Converting => "converting",
            TaskStatus::Converted => "converted",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change together with the fields the new status requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `received → converting`
    Start,
    /// `converting → converted`
    Complete { output_path: PathBuf },
    /// `converting → failed`
    Fail { detail: String },
}

impl Transition {
    /// The status this transition must start from.
    pub fn required_status(&self) -> TaskStatus {
        match self {
            Transition::Start => TaskStatus::Received,
            Transition::Complete { .. } | Transition::Fail { .. } => TaskStatus::Converting,
        }
    }

    /// The status this transition lands in.
    pub fn target_status(&self) -> TaskStatus {
        match self {
            Transition::Start => TaskStatus::Converting,
            Transition::Complete { .. } => TaskStatus::Converted,
            Transition::Fail { .. } => TaskStatus::Failed,
        }
    }
}

/// One document's conversion request, from upload to terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionTask {
    pub id: TaskId,
    /// Client-supplied file name. Display only; never used to build paths.
    pub original_name: String,
    /// The stored raw upload, `<upload_dir>/<id>.<ext>`.
    pub source_path: PathBuf,
    pub status: TaskStatus,
    /// Present if and only if `status == Converted`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Present if and only if `status == Failed`. Names files, never
    /// directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionTask {
    /// A new task in the `received` state.
    pub fn new(id: TaskId, original_name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id,
            original_name: original_name.into(),
            source_path: source_path.into(),
            status: TaskStatus::Received,
            output_path: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a transition, or leave the task untouched and return
    /// [`Doc2PdfError::InvalidState`] when the current status does not allow it.
    pub fn apply(&mut self, transition: Transition) -> Result<(), Doc2PdfError> {
        let required = transition.required_status();
        if self.status != required {
            return Err(Doc2PdfError::InvalidState {
                id: self.id.clone(),
                status: self.status,
                expected: required,
            });
        }

        self.status = transition.target_status();
        match transition {
            Transition::Start => {}
            Transition::Complete { output_path } => self.output_path = Some(output_path),
            Transition::Fail { detail } => self.error_detail = Some(detail),
        }
        // Never move backwards even if the wall clock does.
        self.updated_at = Utc::now().max(self.updated_at);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
