//! Job types for the background unification worker
//!
//! A job ingests a queue of files into the in-memory table and then
//! consolidates the whole table into unified customers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================================================
// Tests First (TDD)
// ==========================================================================


// ==========================================================================
// Implementation
// ==========================================================================

/// Lifecycle of the single background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Idle,
    Running,
    Paused,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Running | JobState::Paused | JobState::Cancelling)
    }

    pub fn accepts_start(self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Cancelling => "cancelling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A file that could not be ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorruptFile {
    pub path: String,
    pub error: String,
}

/// End-of-job summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub files_total: usize,
    pub files_processed: usize,
    pub corrupt_files: Vec<CorruptFile>,
    /// Data rows read from the files, before per-file consolidation
    pub rows_read: usize,
    /// Records appended to the in-memory table
    pub records_added: usize,
    /// Unified customers emitted (zero when cancelled)
    pub customers: usize,
}

/// Status carried by a worker -> controller update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobStatus {
    /// Percentage (0-100) and human-readable message
    #[serde(rename_all = "camelCase")]
    Progress { percent: u8, message: String },
    #[serde(rename_all = "camelCase")]
    Completed { summary: JobSummary },
    #[serde(rename_all = "camelCase")]
    Cancelled { summary: JobSummary },
    #[serde(rename_all = "camelCase")]
    Failed { error: String },
}

impl JobStatus {
    pub fn percent(&self) -> Option<u8> {
        match self {
            JobStatus::Progress { percent, .. } => Some(*percent),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Progress { .. })
    }
}

/// A status update sent from the worker to the controller's consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    pub job_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: JobStatus,
}

impl JobStatusUpdate {
    pub fn new(job_id: Uuid, status: JobStatus) -> Self {
        Self {
            job_id,
            timestamp: chrono::Utc::now(),
            status,
        }
    }
}

/// Final result of one job run, returned by the worker task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(JobSummary),
    Cancelled(JobSummary),
    Failed { error: String },
}
