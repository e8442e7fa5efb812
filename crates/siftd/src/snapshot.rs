use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sift_core::{JobDetails, parse_job_details};
use walkdir::WalkDir;

pub const SNAPSHOT_DIR_NAME: &str = "snapshots";

pub fn default_snapshot_dir(workspace: &Path) -> PathBuf {
    sift_config::sift_dir(workspace).join(SNAPSHOT_DIR_NAME)
}

/// Relative paths are taken from the workspace root.
pub fn resolve_snapshot_dir(workspace: &Path, requested: Option<&Path>) -> PathBuf {
    match requested {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => workspace.join(path),
        None => default_snapshot_dir(workspace),
    }
}

/// Reads every `*.json` file under `dir` in file-name order. Each file holds
/// one job document or an array of them. Files that fail to parse are
/// skipped with a warning.
pub fn load_snapshot_dir(dir: &Path) -> Result<Vec<JobDetails>> {
    if !dir.is_dir() {
        bail!("snapshot directory {} does not exist", dir.display());
    }

    let mut jobs = Vec::new();
    let mut files = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry
            .with_context(|| format!("failed to walk snapshot directory {}", dir.display()))?;
        let path = entry.path();
        let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
        if !entry.file_type().is_file() || !is_json {
            continue;
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        match parse_job_details(&raw) {
            Ok(parsed) => {
                files += 1;
                tracing::debug!(path = %path.display(), jobs = parsed.len(), "loaded snapshot");
                jobs.extend(parsed);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable snapshot");
            }
        }
    }

    tracing::info!(dir = %dir.display(), files, jobs = jobs.len(), "loaded job snapshots");
    Ok(jobs)
}
