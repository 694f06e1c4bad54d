//! Interactive session over one long-lived controller.
//!
//! Each `load`/`scan` starts a job that appends to the same in-memory table,
//! so several batches can be merged before a single `export`.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::services::discovery::discover_files;
use crate::services::export::write_csv;
use crate::services::ingestion::FsSheetReader;
use crate::services::job_controller::{JobControlError, JobController, JobRun};
use crate::services::record_unifier::{FallbackKey, RecordUnifier};
use crate::services::run_log::RunLog;
use crate::types::{
    CanonicalRecord, JobState, JobStatus, JobStatusUpdate, JobSummary, UnifiedCustomer,
};

const SESSION_HELP: &str = "\
Commands:
  load <file>...   ingest files into the table
  scan <dir>       ingest every matching file under a directory
  p | pause | resume | c | cancel
  status           job state and table size
  clear            empty the table
  export [file]    consolidate the table and write it as CSV
  history          recent completed runs
  quit";

/// Job control typed while a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    TogglePause,
    Pause,
    Resume,
    Cancel,
}

impl Control {
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "p" => Some(Control::TogglePause),
            "pause" => Some(Control::Pause),
            "resume" => Some(Control::Resume),
            "c" | "cancel" => Some(Control::Cancel),
            _ => None,
        }
    }

    pub fn apply(self, controller: &JobController) -> Result<(), JobControlError> {
        match self {
            Control::TogglePause => controller.toggle_pause().map(|state| {
                if state == JobState::Paused {
                    println!("Paused. Type `p` to resume.");
                } else {
                    println!("Resumed.");
                }
            }),
            Control::Pause => controller
                .pause()
                .map(|_| println!("Paused. Type `resume` to continue.")),
            Control::Resume => controller.resume().map(|_| println!("Resumed.")),
            Control::Cancel => controller.cancel().map(|_| println!("Cancelling...")),
        }
    }
}

/// One line typed in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Control(Control),
    Load(Vec<PathBuf>),
    Scan(PathBuf),
    Status,
    Clear,
    Export(Option<PathBuf>),
    History,
    Help,
    Quit,
}

impl FromStr for SessionCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            bail!("empty command");
        };
        if let Some(control) = Control::parse(head) {
            return Ok(SessionCommand::Control(control));
        }
        let rest: Vec<&str> = words.collect();
        match (head.to_lowercase().as_str(), rest.as_slice()) {
            ("load", []) => bail!("usage: load <file>..."),
            ("load", files) => Ok(SessionCommand::Load(files.iter().map(PathBuf::from).collect())),
            ("scan", [dir]) => Ok(SessionCommand::Scan(PathBuf::from(dir))),
            ("scan", _) => bail!("usage: scan <dir>"),
            ("status" | "s", _) => Ok(SessionCommand::Status),
            ("clear", _) => Ok(SessionCommand::Clear),
            ("export", []) => Ok(SessionCommand::Export(None)),
            ("export", [file]) => Ok(SessionCommand::Export(Some(PathBuf::from(file)))),
            ("export", _) => bail!("usage: export [file]"),
            ("history", _) => Ok(SessionCommand::History),
            ("help" | "?", _) => Ok(SessionCommand::Help),
            ("quit" | "exit" | "q", _) => Ok(SessionCommand::Quit),
            (other, _) => bail!("unknown command '{}' (type `help`)", other),
        }
    }
}

/// Lines typed on stdin, read on a plain thread so shutdown never waits on it
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub fn print_progress(update: &JobStatusUpdate) {
    if let JobStatus::Progress { percent, message } = &update.status {
        println!("[{:>3}%] {}", percent, message);
    }
}

pub fn print_corrupt_files(summary: &JobSummary) {
    for corrupt in &summary.corrupt_files {
        println!("Skipped {}: {}", corrupt.path, corrupt.error);
    }
}

/// Run a unification pass over `records` off the async runtime
async fn consolidate_table(
    fallback: FallbackKey,
    records: Vec<CanonicalRecord>,
) -> Result<Vec<UnifiedCustomer>> {
    let customers =
        tokio::task::spawn_blocking(move || RecordUnifier::new(fallback).unify(&records)).await??;
    Ok(customers)
}

/// Consolidate the controller's table and write it to `path`.
///
/// Returns the number of customers written, or `None` for an empty table.
pub async fn export_table(
    controller: &JobController,
    fallback: FallbackKey,
    path: &Path,
) -> Result<Option<usize>> {
    let records = controller.records();
    if records.is_empty() {
        return Ok(None);
    }
    let customers = consolidate_table(fallback, records).await?;
    write_csv(path, &customers)?;
    Ok(Some(customers.len()))
}

struct ActiveJob {
    job_id: Uuid,
    updates: mpsc::UnboundedReceiver<JobStatusUpdate>,
}

struct Session<'a> {
    config: &'a Config,
    controller: JobController,
    run_log: Arc<RunLog>,
    active: Option<ActiveJob>,
    last_percent: Option<u8>,
}

/// Next update of the running job; never resolves while idle
async fn next_update(active: &mut Option<ActiveJob>) -> Option<JobStatusUpdate> {
    match active {
        Some(job) => job.updates.recv().await,
        None => std::future::pending().await,
    }
}

impl<'a> Session<'a> {
    fn new(config: &'a Config) -> Self {
        let run_log = Arc::new(RunLog::open(&config.run_log_path));
        let controller = JobController::new(
            Arc::new(FsSheetReader),
            Arc::new(RecordUnifier::new(config.fallback_key)),
            config.job_config(),
            Some(Arc::clone(&run_log)),
        );
        Self {
            config,
            controller,
            run_log,
            active: None,
            last_percent: None,
        }
    }

    fn start(&mut self, paths: Vec<PathBuf>, job_type: &str) {
        match self.controller.start(paths, job_type) {
            Ok(JobRun { job_id, updates, .. }) => {
                info!("Session started job {}", job_id);
                self.last_percent = None;
                self.active = Some(ActiveJob { job_id, updates });
            }
            Err(e) => warn!("{}", e),
        }
    }

    fn on_update(&mut self, update: Option<JobStatusUpdate>) {
        let Some(update) = update else {
            self.active = None;
            return;
        };
        if let Some(percent) = update.status.percent() {
            self.last_percent = Some(percent);
        }
        match &update.status {
            JobStatus::Progress { .. } => print_progress(&update),
            JobStatus::Completed { summary } => {
                print_corrupt_files(summary);
                println!(
                    "Loaded {} rows from {} files; table holds {} records, {} customers",
                    summary.rows_read,
                    summary.files_processed,
                    self.controller.records().len(),
                    summary.customers
                );
            }
            JobStatus::Cancelled { summary } => {
                println!(
                    "Cancelled after {} of {} files; {} records kept in the table",
                    summary.files_processed, summary.files_total, summary.records_added
                );
            }
            JobStatus::Failed { error } => println!("Job failed: {}", error),
        }
        if update.status.is_terminal() {
            self.active = None;
        }
    }

    /// Handle one typed line; false ends the session
    async fn on_line(&mut self, line: &str) -> bool {
        if line.trim().is_empty() {
            return true;
        }
        let command = match line.parse::<SessionCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                return true;
            }
        };
        match command {
            SessionCommand::Control(control) => {
                if let Err(e) = control.apply(&self.controller) {
                    warn!("{}", e);
                }
            }
            SessionCommand::Load(paths) => {
                let job_type = if paths.len() == 1 { "single_file" } else { "multiple_files" };
                self.start(paths, job_type);
            }
            SessionCommand::Scan(dir) => {
                let files = discover_files(&dir, &self.config.scan_keywords);
                if files.is_empty() {
                    println!("No matching files under {}", dir.display());
                } else {
                    self.start(files, "directory");
                }
            }
            SessionCommand::Status => self.print_status(),
            SessionCommand::Clear => match self.controller.clear() {
                Ok(()) => println!("Table cleared."),
                Err(e) => warn!("{}", e),
            },
            SessionCommand::Export(path) => {
                let path = path.unwrap_or_else(crate::default_output_path);
                if let Err(e) = self.export(&path).await {
                    warn!("Export failed: {:#}", e);
                }
            }
            SessionCommand::History => {
                let entries = self.run_log.recent(10);
                println!("{} runs recorded", self.run_log.len());
                for entry in entries {
                    println!(
                        "#{:<4} {:<14} {:>7} rows  {}",
                        entry.id, entry.job_type, entry.row_count, entry.source_summary
                    );
                }
            }
            SessionCommand::Help => println!("{}", SESSION_HELP),
            SessionCommand::Quit => return false,
        }
        true
    }

    fn print_status(&self) {
        let state = self.controller.state();
        match (&self.active, self.last_percent) {
            (Some(job), Some(percent)) => println!("Job {}: {} ({}%)", job.job_id, state, percent),
            (Some(job), None) => println!("Job {}: {}", job.job_id, state),
            (None, _) => println!("No job running (last state: {})", state),
        }
        println!("Table: {} records", self.controller.records().len());
        if let Some(error) = self.controller.last_error() {
            println!("Last error: {}", error);
        }
    }

    async fn export(&self, path: &Path) -> Result<()> {
        if self.controller.state().is_active() {
            bail!("a job is still running");
        }
        match export_table(&self.controller, self.config.fallback_key, path).await? {
            Some(count) => println!("Wrote {} customers to {}", count, path.display()),
            None => bail!("the table is empty; load files first"),
        }
        Ok(())
    }

    /// Cancel a running job and wait for it to settle
    async fn shutdown(&mut self) {
        let Some(mut job) = self.active.take() else { return };
        if let Err(e) = self.controller.cancel() {
            warn!("{}", e);
        }
        while let Some(update) = job.updates.recv().await {
            if update.status.is_terminal() {
                break;
            }
        }
        info!("Session job {} stopped", job.job_id);
    }
}

pub async fn run_session(config: &Config) -> Result<()> {
    let mut session = Session::new(config);
    let mut input = spawn_stdin_reader();
    println!("{}", SESSION_HELP);

    loop {
        tokio::select! {
            update = next_update(&mut session.active) => session.on_update(update),
            line = input.recv() => match line {
                Some(line) => {
                    if !session.on_line(&line).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if session.active.is_none() {
                    break;
                }
                warn!("Interrupt received, cancelling the running job");
                if let Err(e) = session.controller.cancel() {
                    warn!("{}", e);
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
