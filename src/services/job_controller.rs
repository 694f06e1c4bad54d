//! Background job controller
//!
//! Owns the in-memory customer table and runs at most one job at a time.
//! A job reads its queue of files on a worker task, appending each file's
//! records, then consolidates the whole table into unified customers.
//!
//! ## States
//! `Idle -> Running <-> Paused`, `Running|Paused -> Cancelling`, and the
//! terminal `Completed`, `Failed`, `Cancelled`. Terminal states accept a new
//! `start`.
//!
//! Pause and cancel are observed between files and before consolidation.
//! A cancelled job keeps the rows of files it finished; a failed job keeps
//! none of its rows.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::defaults::{DEFAULT_HEADER_SCAN_ROWS, DEFAULT_PAUSE_POLL_MS};
use crate::services::ingestion::{ingest_file, SheetReader};
use crate::services::record_unifier::{Consolidator, UnifyError};
use crate::services::run_log::{source_summary, RunLog};
use crate::types::{
    CanonicalRecord, CorruptFile, JobOutcome, JobState, JobStatus, JobStatusUpdate, JobSummary,
    UnifiedCustomer,
};

/// Share of the progress bar spent reading files
const SCAN_PROGRESS_SHARE: usize = 80;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobControlError {
    #[error("a job is already {state}")]
    AlreadyRunning { state: JobState },
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: JobState },
}

/// Tunables for job execution
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub header_scan_rows: usize,
    /// Wake-up interval while paused
    pub pause_poll: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
            pause_poll: Duration::from_millis(DEFAULT_PAUSE_POLL_MS),
        }
    }
}

/// Handle to a started job
#[derive(Debug)]
pub struct JobRun {
    pub job_id: Uuid,
    pub updates: mpsc::UnboundedReceiver<JobStatusUpdate>,
    pub handle: JoinHandle<JobOutcome>,
}

enum Transition {
    To(JobState),
    Stay,
    Reject,
}

/// Sends progress updates, never letting the percentage go backwards
#[derive(Clone)]
struct ProgressReporter {
    job_id: Uuid,
    tx: mpsc::UnboundedSender<JobStatusUpdate>,
    last: u8,
}

impl ProgressReporter {
    fn report(&mut self, percent: u8, message: impl Into<String>) {
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        self.send(JobStatus::Progress {
            percent,
            message: message.into(),
        });
    }

    fn send(&self, status: JobStatus) {
        // Receiver may be gone; the job still runs to completion
        let _ = self.tx.send(JobStatusUpdate::new(self.job_id, status));
    }
}

struct Inner {
    state: watch::Sender<JobState>,
    reader: Arc<dyn SheetReader>,
    consolidator: Arc<dyn Consolidator>,
    config: JobConfig,
    run_log: Option<Arc<RunLog>>,
    table: RwLock<Vec<CanonicalRecord>>,
    unified: RwLock<Vec<UnifiedCustomer>>,
    last_error: RwLock<Option<String>>,
}

#[derive(Clone)]
pub struct JobController {
    inner: Arc<Inner>,
}

impl JobController {
    pub fn new(
        reader: Arc<dyn SheetReader>,
        consolidator: Arc<dyn Consolidator>,
        config: JobConfig,
        run_log: Option<Arc<RunLog>>,
    ) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            inner: Arc::new(Inner {
                state,
                reader,
                consolidator,
                config,
                run_log,
                table: RwLock::new(Vec::new()),
                unified: RwLock::new(Vec::new()),
                last_error: RwLock::new(None),
            }),
        }
    }

    /// Start a job over `paths`. Must be called inside a Tokio runtime.
    pub fn start(&self, paths: Vec<PathBuf>, job_type: &str) -> Result<JobRun, JobControlError> {
        let mut rejected = None;
        self.inner.state.send_if_modified(|state| {
            if state.accepts_start() {
                *state = JobState::Running;
                true
            } else {
                rejected = Some(*state);
                false
            }
        });
        if let Some(state) = rejected {
            return Err(JobControlError::AlreadyRunning { state });
        }

        *self.inner.last_error.write() = None;

        let job_id = Uuid::new_v4();
        let (tx, updates) = mpsc::unbounded_channel();
        let inner = Arc::clone(&self.inner);
        let job_type = job_type.to_string();

        info!("Job {} ({}) queued with {} files", job_id, job_type, paths.len());
        let handle = tokio::spawn(async move { inner.run(job_id, paths, job_type, tx).await });

        Ok(JobRun {
            job_id,
            updates,
            handle,
        })
    }

    pub fn pause(&self) -> Result<(), JobControlError> {
        self.transition("pause", |state| match state {
            JobState::Running => Transition::To(JobState::Paused),
            JobState::Paused => Transition::Stay,
            _ => Transition::Reject,
        })
    }

    pub fn resume(&self) -> Result<(), JobControlError> {
        self.transition("resume", |state| match state {
            JobState::Paused => Transition::To(JobState::Running),
            JobState::Running => Transition::Stay,
            _ => Transition::Reject,
        })
    }

    /// Pause a running job or resume a paused one; returns the new state
    pub fn toggle_pause(&self) -> Result<JobState, JobControlError> {
        self.transition("toggle pause", |state| match state {
            JobState::Running => Transition::To(JobState::Paused),
            JobState::Paused => Transition::To(JobState::Running),
            _ => Transition::Reject,
        })?;
        Ok(self.state())
    }

    /// Request cancellation; honoured at the next checkpoint
    pub fn cancel(&self) -> Result<(), JobControlError> {
        self.transition("cancel", |state| match state {
            JobState::Running | JobState::Paused => Transition::To(JobState::Cancelling),
            JobState::Cancelling => Transition::Stay,
            _ => Transition::Reject,
        })
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.borrow()
    }

    /// Snapshot of the in-memory table
    pub fn records(&self) -> Vec<CanonicalRecord> {
        self.inner.table.read().clone()
    }

    /// Output of the last completed job
    pub fn unified(&self) -> Vec<UnifiedCustomer> {
        self.inner.unified.read().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    /// Drop the in-memory table and the last output
    pub fn clear(&self) -> Result<(), JobControlError> {
        let state = self.state();
        if state.is_active() {
            return Err(JobControlError::InvalidTransition { action: "clear", state });
        }
        self.inner.table.write().clear();
        self.inner.unified.write().clear();
        info!("In-memory table cleared");
        Ok(())
    }

    fn transition(
        &self,
        action: &'static str,
        step: impl FnOnce(JobState) -> Transition,
    ) -> Result<(), JobControlError> {
        let mut result = Ok(());
        self.inner.state.send_if_modified(|state| match step(*state) {
            Transition::To(next) => {
                debug!("Job state {} -> {}", state, next);
                *state = next;
                true
            }
            Transition::Stay => false,
            Transition::Reject => {
                result = Err(JobControlError::InvalidTransition { action, state: *state });
                false
            }
        });
        result
    }
}

impl Inner {
    /// Wait out a pause. Returns false once cancellation was requested.
    async fn checkpoint(&self) -> bool {
        loop {
            let state = *self.state.borrow();
            match state {
                JobState::Paused => tokio::time::sleep(self.config.pause_poll).await,
                JobState::Cancelling => return false,
                _ => return true,
            }
        }
    }

    async fn run(
        self: Arc<Self>,
        job_id: Uuid,
        paths: Vec<PathBuf>,
        job_type: String,
        tx: mpsc::UnboundedSender<JobStatusUpdate>,
    ) -> JobOutcome {
        let mut progress = ProgressReporter { job_id, tx, last: 0 };
        let total = paths.len();
        let mut summary = JobSummary {
            files_total: total,
            ..Default::default()
        };
        let mut added: Vec<CanonicalRecord> = Vec::new();

        info!("Job {} started: {} files", job_id, total);
        progress.report(0, format!("Scanning {} files", total));

        let mut cancelled = false;
        for (idx, path) in paths.iter().enumerate() {
            if !self.checkpoint().await {
                cancelled = true;
                break;
            }

            let reader = Arc::clone(&self.reader);
            let scan_rows = self.config.header_scan_rows;
            let file = path.clone();
            let result =
                tokio::task::spawn_blocking(move || ingest_file(reader.as_ref(), &file, scan_rows))
                    .await
                .map_err(|e| anyhow::anyhow!("reader task failed: {}", e))
                .and_then(|r| r);

            match result {
                Ok(ingested) => {
                    debug!(
                        "Job {}: {} gave {} rows, {} records",
                        job_id,
                        ingested.path,
                        ingested.rows_read,
                        ingested.records.len()
                    );
                    summary.rows_read += ingested.rows_read;
                    added.extend(ingested.records);
                }
                Err(e) => {
                    warn!("Job {}: skipping {}: {:#}", job_id, path.display(), e);
                    summary.corrupt_files.push(CorruptFile {
                        path: path.display().to_string(),
                        error: format!("{:#}", e),
                    });
                }
            }
            summary.files_processed += 1;

            let percent = ((idx + 1) * SCAN_PROGRESS_SHARE / total) as u8;
            let message = format!("Read file {} of {}: {}", idx + 1, total, path.display());
            progress.report(percent, message);
        }

        if !cancelled && !self.checkpoint().await {
            cancelled = true;
        }
        summary.records_added = added.len();

        let source = source_summary(&paths);
        if cancelled {
            return self.settle(&mut progress, added, None, summary, &job_type, source);
        }

        progress.report(SCAN_PROGRESS_SHARE as u8, "Consolidating customer table");

        let mut table = self.table.read().clone();
        table.extend(added.iter().cloned());

        let consolidator = Arc::clone(&self.consolidator);
        let mut sub = progress.clone();
        let consolidated = tokio::task::spawn_blocking(move || {
            consolidator.consolidate(&table, &mut |percent, message| {
                let share = 100 - SCAN_PROGRESS_SHARE as u16;
                let mapped = SCAN_PROGRESS_SHARE as u16 + percent.min(100) as u16 * share / 100;
                sub.report(mapped as u8, message);
            })
        })
        .await
        .unwrap_or_else(|e| Err(UnifyError::Internal(e.to_string())));

        match consolidated {
            Ok(customers) => {
                self.settle(&mut progress, added, Some(customers), summary, &job_type, source)
            }
            Err(e) => {
                let error = e.to_string();
                error!("Job {} failed: {}", job_id, error);
                *self.last_error.write() = Some(error.clone());
                self.state.send_replace(JobState::Failed);
                progress.send(JobStatus::Failed { error: error.clone() });
                JobOutcome::Failed { error }
            }
        }
    }

    /// Commit the job's rows and pick the terminal state.
    ///
    /// A job cancelled during consolidation still ends `Cancelled` and its
    /// output is discarded.
    fn settle(
        &self,
        progress: &mut ProgressReporter,
        added: Vec<CanonicalRecord>,
        customers: Option<Vec<UnifiedCustomer>>,
        mut summary: JobSummary,
        job_type: &str,
        source: String,
    ) -> JobOutcome {
        let completed = {
            let mut table = self.table.write();
            table.extend(added);

            let mut completed = false;
            self.state.send_modify(|state| {
                completed = customers.is_some() && *state != JobState::Cancelling;
                *state = if completed { JobState::Completed } else { JobState::Cancelled };
            });

            if completed {
                if let Some(customers) = customers {
                    summary.customers = customers.len();
                    *self.unified.write() = customers;
                }
            }
            completed
        };

        if completed {
            if let Some(log) = &self.run_log {
                log.append(job_type, source, summary.rows_read);
            }
            info!(
                "Job {} completed: {} files, {} rows, {} customers, {} corrupt",
                progress.job_id,
                summary.files_processed,
                summary.rows_read,
                summary.customers,
                summary.corrupt_files.len()
            );
            progress.report(100, "Done");
            progress.send(JobStatus::Completed { summary: summary.clone() });
            JobOutcome::Completed(summary)
        } else {
            info!(
                "Job {} cancelled after {} of {} files",
                progress.job_id, summary.files_processed, summary.files_total
            );
            progress.send(JobStatus::Cancelled { summary: summary.clone() });
            JobOutcome::Cancelled(summary)
        }
    }
}
