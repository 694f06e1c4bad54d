//! CLI argument parsing for the customer-unifier binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "customer-unifier",
    about = "Unify customer contact spreadsheets into one deduplicated table"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest files and export the unified table.
    /// While running, type `p` + Enter to toggle pause (or `pause`/`resume`)
    /// and `c` + Enter to cancel. A cancelled run still writes the rows of
    /// the files it finished.
    Run {
        /// Spreadsheet or CSV files to ingest, in order
        paths: Vec<PathBuf>,
        /// Also scan this directory recursively for matching files
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output CSV (default: Base_Optimizada_<YYYYMMDD>.csv)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Label stored in the run log
        #[arg(long)]
        job_type: Option<String>,
    },
    /// List the files a directory scan would pick up
    Scan {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Show the most recent completed runs
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Load several batches into one table interactively, then export it
    Session,
}
