//! Directory scanner feeding the job queue

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::defaults::SUPPORTED_EXTENSIONS;

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            SUPPORTED_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s))
        })
}

fn name_matches(name: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let lowered = name.to_lowercase();
    keywords.iter().any(|k| lowered.contains(&k.to_lowercase()))
}

/// Recursively collect spreadsheet/CSV files under `root` whose name
/// contains one of `keywords`. An empty keyword list accepts every file.
pub fn discover_files(root: &Path, keywords: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            // Office lock files
            !name.starts_with("~$")
                && has_supported_extension(entry.path())
                && name_matches(&name, keywords)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    debug!("Discovered {} files under {}", files.len(), root.display());
    files
}
