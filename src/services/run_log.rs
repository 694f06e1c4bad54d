//! Run log service
//!
//! Append-only record of completed job batches, kept in memory with
//! file-backed persistence so the log survives restarts.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const MAX_RUN_LOG_SIZE: usize = 500;

/// One completed job batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub job_type: String,
    pub source_summary: String,
    pub row_count: usize,
}

/// Summary of the sources a job read from
pub fn source_summary(paths: &[PathBuf]) -> String {
    match paths {
        [single] => single.display().to_string(),
        many => format!("Multiple files ({})", many.len()),
    }
}

/// Run log backed by an in-memory deque (newest first) + JSON file on disk.
pub struct RunLog {
    path: Option<PathBuf>,
    entries: RwLock<VecDeque<RunLogEntry>>,
}

impl RunLog {
    /// Open the log at `path`, loading existing entries if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut deque = VecDeque::with_capacity(MAX_RUN_LOG_SIZE);
        if let Some(loaded) = Self::load_from_disk(&path) {
            deque.extend(loaded);
            info!("Loaded {} run log entries from {}", deque.len(), path.display());
        }
        Self {
            path: Some(path),
            entries: RwLock::new(deque),
        }
    }

    /// Log that is never written to disk
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(VecDeque::with_capacity(MAX_RUN_LOG_SIZE)),
        }
    }

    pub fn append(&self, job_type: &str, source_summary: String, row_count: usize) -> RunLogEntry {
        let mut entries = self.entries.write();
        let id = entries.front().map_or(1, |e| e.id + 1);

        let entry = RunLogEntry {
            id,
            timestamp: Utc::now(),
            job_type: job_type.to_string(),
            source_summary,
            row_count,
        };

        if entries.len() >= MAX_RUN_LOG_SIZE {
            entries.pop_back();
        }
        entries.push_front(entry.clone());

        if let Some(path) = &self.path {
            Self::save_to_disk(path, &entries);
        }
        entry
    }

    /// Most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<RunLogEntry> {
        self.entries.read().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn load_from_disk(path: &Path) -> Option<Vec<RunLogEntry>> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<RunLogEntry>>(&content) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!("Failed to parse run log file: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read run log file: {}", e);
                None
            }
        }
    }

    fn save_to_disk(path: &Path, entries: &VecDeque<RunLogEntry>) {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create run log directory: {}", e);
                return;
            }
        }
        let entries: Vec<&RunLogEntry> = entries.iter().collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Failed to write run log file: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize run log: {}", e),
        }
    }
}
