//! Customer Unifier - consolidates customer spreadsheets into one table
//!
//! Reads heterogeneous Excel/CSV exports, discovers their headers and
//! columns, merges duplicate customers and writes a clean CSV.

mod cli;
mod config;
mod defaults;
mod services;
mod session;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::services::discovery::discover_files;
use crate::services::export::write_csv;
use crate::services::ingestion::FsSheetReader;
use crate::services::job_controller::{JobController, JobRun};
use crate::services::record_unifier::RecordUnifier;
use crate::services::run_log::RunLog;
use crate::session::{
    export_table, print_corrupt_files, print_progress, run_session, spawn_stdin_reader, Control,
};
use crate::types::JobOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.logs_dir, "unifier.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,customer_unifier=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    match cli.command {
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
        Some(Command::Scan { dir }) => {
            let files = discover_files(&dir, &config.scan_keywords);
            for file in &files {
                println!("{}", file.display());
            }
            println!("{} matching files", files.len());
            Ok(())
        }
        Some(Command::History { limit }) => {
            let log = RunLog::open(&config.run_log_path);
            if log.is_empty() {
                println!("No runs recorded yet");
            }
            for entry in log.recent(limit) {
                println!(
                    "#{:<4} {}  {:<14} {:>7} rows  {}",
                    entry.id,
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.job_type,
                    entry.row_count,
                    entry.source_summary
                );
            }
            Ok(())
        }
        Some(Command::Run {
            paths,
            dir,
            output,
            job_type,
        }) => run_job(&config, paths, dir, output, job_type).await,
        Some(Command::Session) => run_session(&config).await,
    }
}

pub(crate) fn default_output_path() -> PathBuf {
    PathBuf::from(format!(
        "Base_Optimizada_{}.csv",
        chrono::Local::now().format("%Y%m%d")
    ))
}

fn handle_input(controller: &JobController, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match Control::parse(line) {
        Some(control) => {
            if let Err(e) = control.apply(controller) {
                warn!("{}", e);
            }
        }
        None => println!(
            "Unknown command '{}' (p = toggle pause, pause, resume, c = cancel)",
            line
        ),
    }
}

async fn run_job(
    config: &Config,
    mut paths: Vec<PathBuf>,
    dir: Option<PathBuf>,
    output: Option<PathBuf>,
    job_type: Option<String>,
) -> Result<()> {
    if let Some(dir) = &dir {
        paths.extend(discover_files(dir, &config.scan_keywords));
    }
    if paths.is_empty() {
        anyhow::bail!("no input files: pass file paths or --dir");
    }

    let job_type = job_type.unwrap_or_else(|| {
        match (&dir, paths.len()) {
            (Some(_), _) => "directory",
            (None, 1) => "single_file",
            (None, _) => "multiple_files",
        }
        .to_string()
    });

    let run_log = Arc::new(RunLog::open(&config.run_log_path));
    let controller = JobController::new(
        Arc::new(FsSheetReader),
        Arc::new(RecordUnifier::new(config.fallback_key)),
        config.job_config(),
        Some(run_log),
    );

    let JobRun {
        job_id,
        mut updates,
        handle,
    } = controller.start(paths, &job_type)?;
    info!("Started job {}", job_id);
    println!("Type `p` + Enter to toggle pause (or `pause`/`resume`), `c` + Enter to cancel.");

    let mut input = spawn_stdin_reader();
    let mut input_open = true;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) if update.status.is_terminal() => break,
                Some(update) => print_progress(&update),
                None => break,
            },
            line = input.recv(), if input_open => match line {
                Some(line) => handle_input(&controller, &line),
                None => input_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupt received, cancelling job {}", job_id);
                if let Err(e) = controller.cancel() {
                    warn!("{}", e);
                }
            }
        }
    }

    let output = output.unwrap_or_else(default_output_path);
    match handle.await? {
        JobOutcome::Completed(summary) => {
            write_csv(&output, &controller.unified())?;
            print_corrupt_files(&summary);
            println!(
                "Processed {} of {} files: {} rows -> {} customers, written to {}",
                summary.files_processed,
                summary.files_total,
                summary.rows_read,
                summary.customers,
                output.display()
            );
            Ok(())
        }
        JobOutcome::Cancelled(summary) => {
            print_corrupt_files(&summary);
            match export_table(&controller, config.fallback_key, &output).await? {
                Some(count) => println!(
                    "Cancelled after {} of {} files; wrote {} customers to {}",
                    summary.files_processed,
                    summary.files_total,
                    count,
                    output.display()
                ),
                None => println!(
                    "Cancelled after {} of {} files; no rows to write",
                    summary.files_processed, summary.files_total
                ),
            }
            Ok(())
        }
        JobOutcome::Failed { error } => {
            error!("Job {} failed: {}", job_id, error);
            anyhow::bail!("job failed: {}", error)
        }
    }
}
