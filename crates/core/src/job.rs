//! Try-on job model and status mapping.
//!
//! A [`Job`] is one remote synthesis request. Its status only moves
//! forward; result and error are mutually exclusive and only present once
//! the job is terminal.

use std::fmt;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Remote status vocabulary
// ---------------------------------------------------------------------------

/// Remote status marking a successfully completed task.
pub const REMOTE_STATUS_SUCCEED: &str = "succeed";
/// Remote status marking a failed task.
pub const REMOTE_STATUS_FAILED: &str = "failed";
/// Remote status for a task that was accepted but not started.
pub const REMOTE_STATUS_SUBMITTED: &str = "submitted";
/// Remote status for a queued task.
pub const REMOTE_STATUS_PENDING: &str = "pending";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Map the remote `task_status` string onto a job status.
    ///
    /// The remote vocabulary is open: unknown values are treated as still
    /// running so that new intermediate states keep the job polling.
    pub fn from_remote(task_status: &str) -> Self {
        match task_status {
            REMOTE_STATUS_SUCCEED => Self::Succeeded,
            REMOTE_STATUS_FAILED => Self::Failed,
            REMOTE_STATUS_SUBMITTED | REMOTE_STATUS_PENDING => Self::Pending,
            _ => Self::Running,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

// ---------------------------------------------------------------------------
// Failure record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The status query itself failed (transport, HTTP status, bad body).
    Poll,
    /// The remote service reported the task as failed.
    Remote,
    /// The task succeeded but the response carried no image.
    MissingResult,
}

/// Why a job failed, with the underlying cause rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Snapshot of one remote try-on job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    id: String,
    status: JobStatus,
    result_reference: Option<String>,
    error: Option<JobFailure>,
    submitted_at: Timestamp,
    updated_at: Timestamp,
}

impl Job {
    /// A freshly created job, as returned by the submit call.
    pub fn submitted(id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            result_reference: None,
            error: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// URL of the generated image. Only set once the job succeeded.
    pub fn result_reference(&self) -> Option<&str> {
        self.result_reference.as_deref()
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn submitted_at(&self) -> Timestamp {
        self.submitted_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Record a non-terminal status observation.
    ///
    /// Returns `Ok(true)` when the status changed. Observing the current
    /// status again is a no-op.
    pub fn observe(&mut self, status: JobStatus) -> Result<bool, CoreError> {
        if status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        if status == self.status {
            return Ok(false);
        }
        self.advance(status)?;
        Ok(true)
    }

    /// Move to `Succeeded` with the artifact URL.
    pub fn succeed(&mut self, url: impl Into<String>) -> Result<(), CoreError> {
        self.advance(JobStatus::Succeeded)?;
        self.result_reference = Some(url.into());
        Ok(())
    }

    /// Move to `Failed` with the given cause.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), CoreError> {
        self.advance(JobStatus::Failed)?;
        self.error = Some(failure);
        Ok(())
    }

    fn advance(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }
}
