//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{self, Context, Result};

use crate::defaults::{
    default_scan_keywords, DEFAULT_HEADER_SCAN_ROWS, DEFAULT_PAUSE_POLL_MS, DEFAULT_RUN_LOG_PATH,
    MAX_PAUSE_POLL_MS,
};
use crate::services::job_controller::JobConfig;
use crate::services::record_unifier::FallbackKey;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the rolling log file
    pub logs_dir: String,

    /// JSON file holding the run log
    pub run_log_path: PathBuf,

    /// Wake-up interval of a paused worker, in milliseconds
    pub pause_poll_ms: u64,

    /// Rows inspected when looking for a header
    pub header_scan_rows: usize,

    /// File-name keywords used by directory scans (empty accepts all)
    pub scan_keywords: Vec<String>,

    pub fallback_key: FallbackKey,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string());

        let run_log_path = std::env::var("RUN_LOG_PATH")
            .unwrap_or_else(|_| DEFAULT_RUN_LOG_PATH.to_string())
            .into();

        let pause_poll_ms = match std::env::var("PAUSE_POLL_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .context("PAUSE_POLL_MS must be a number of milliseconds")?,
            Err(_) => DEFAULT_PAUSE_POLL_MS,
        };
        if pause_poll_ms == 0 || pause_poll_ms > MAX_PAUSE_POLL_MS {
            anyhow::bail!(
                "PAUSE_POLL_MS must be between 1 and {} (current: {})",
                MAX_PAUSE_POLL_MS,
                pause_poll_ms
            );
        }

        let header_scan_rows = match std::env::var("HEADER_SCAN_ROWS") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .context("HEADER_SCAN_ROWS must be a positive integer")?,
            Err(_) => DEFAULT_HEADER_SCAN_ROWS,
        };
        if header_scan_rows == 0 {
            anyhow::bail!("HEADER_SCAN_ROWS must be at least 1");
        }

        let scan_keywords = std::env::var("SCAN_KEYWORDS")
            .map(|raw| parse_keywords(&raw))
            .unwrap_or_else(|_| default_scan_keywords());

        let fallback_key = match std::env::var("FALLBACK_KEY") {
            Ok(raw) => raw.parse().context("invalid FALLBACK_KEY")?,
            Err(_) => FallbackKey::default(),
        };

        Ok(Self {
            logs_dir,
            run_log_path,
            pause_poll_ms,
            header_scan_rows,
            scan_keywords,
            fallback_key,
        })
    }

    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            header_scan_rows: self.header_scan_rows,
            pause_poll: Duration::from_millis(self.pause_poll_ms),
        }
    }
}

/// Comma-separated keyword list; blanks are dropped
fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
