use crate::error::Error;
use crate::model::CONTAINER_EXTENSIONS;
use crate::period::days_before;
use crate::progress::ArchiveReporter;
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Which containers the post-archive sweep removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Disabled,
    /// Keep the N most recently modified containers directly in the destination.
    KeepLastN(usize),
    /// Remove any file under the destination modified before `now - days`.
    AgeCutoff(u64),
}

impl RetentionPolicy {
    /// Keep-last-N wins whenever it is positive.
    pub fn select(keep_last_n: i64, retention_days: i64) -> Self {
        if keep_last_n > 0 {
            RetentionPolicy::KeepLastN(keep_last_n as usize)
        } else if retention_days > 0 {
            RetentionPolicy::AgeCutoff(retention_days as u64)
        } else {
            RetentionPolicy::Disabled
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RetentionPolicy::Disabled => "disabled".to_string(),
            RetentionPolicy::KeepLastN(n) => format!("keep last {}", n),
            RetentionPolicy::AgeCutoff(days) => format!("older than {} days", days),
        }
    }
}

#[derive(Debug, Default)]
pub struct RetentionOutcome {
    pub removed: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Sweep `dest_dir` once. Individual failures land in `errors` and the sweep
/// carries on; `Err` is only returned when the directory cannot be listed at all.
pub fn apply_retention(
    dest_dir: &Path,
    policy: RetentionPolicy,
    now: &DateTime<Local>,
    reporter: &dyn ArchiveReporter,
) -> Result<RetentionOutcome, Error> {
    apply_retention_with(dest_dir, policy, now, reporter, |path| fs::remove_file(path))
}

/// [`apply_retention`] with the file removal supplied by the caller.
pub fn apply_retention_with<F>(
    dest_dir: &Path,
    policy: RetentionPolicy,
    now: &DateTime<Local>,
    reporter: &dyn ArchiveReporter,
    mut remove_file: F,
) -> Result<RetentionOutcome, Error>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    match policy {
        RetentionPolicy::Disabled => Ok(RetentionOutcome::default()),
        RetentionPolicy::KeepLastN(keep) => keep_last_n(dest_dir, keep, reporter, &mut remove_file),
        RetentionPolicy::AgeCutoff(days) => Ok(remove_older_than(
            dest_dir,
            days_before(now, days),
            reporter,
            &mut remove_file,
        )),
    }
}

pub fn is_container(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| CONTAINER_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

fn keep_last_n(
    dest_dir: &Path,
    keep: usize,
    reporter: &dyn ArchiveReporter,
    remove_file: &mut dyn FnMut(&Path) -> io::Result<()>,
) -> Result<RetentionOutcome, Error> {
    let mut outcome = RetentionOutcome::default();
    let mut containers: Vec<(PathBuf, DateTime<Local>)> = Vec::new();

    for entry in fs::read_dir(dest_dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                outcome.errors.push(format!(
                    "retention: reading {}: {}",
                    dest_dir.display(),
                    err
                ));
                continue;
            }
        };
        let path = entry.path();
        if !is_container(&path) {
            continue;
        }
        match fs::metadata(&path).and_then(|m| Ok((m.is_file(), m.modified()?))) {
            Ok((true, modified)) => containers.push((path, modified.into())),
            Ok((false, _)) => {}
            Err(err) => outcome
                .errors
                .push(format!("retention: stat {}: {}", path.display(), err)),
        }
    }

    containers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    for (path, _) in containers.into_iter().skip(keep) {
        info!(
            "Removing old compressed log (keep last {}): {}",
            keep,
            path.display()
        );
        remove(path, reporter, remove_file, &mut outcome);
    }
    Ok(outcome)
}

fn remove_older_than(
    dest_dir: &Path,
    cutoff: DateTime<Local>,
    reporter: &dyn ArchiveReporter,
    remove_file: &mut dyn FnMut(&Path) -> io::Result<()>,
) -> RetentionOutcome {
    let mut outcome = RetentionOutcome::default();

    for entry in WalkDir::new(dest_dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                outcome.errors.push(format!("retention: {}", err));
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let modified: DateTime<Local> = match entry.metadata().map_err(|e| e.to_string()).and_then(
            |m| m.modified().map_err(|e| e.to_string()),
        ) {
            Ok(modified) => modified.into(),
            Err(err) => {
                outcome.errors.push(format!(
                    "retention: stat {}: {}",
                    entry.path().display(),
                    err
                ));
                continue;
            }
        };
        if modified < cutoff {
            info!("Removing old compressed log: {}", entry.path().display());
            remove(entry.into_path(), reporter, remove_file, &mut outcome);
        }
    }
    outcome
}

fn remove(
    path: PathBuf,
    reporter: &dyn ArchiveReporter,
    remove_file: &mut dyn FnMut(&Path) -> io::Result<()>,
    outcome: &mut RetentionOutcome,
) {
    match remove_file(&path) {
        Ok(()) => {
            reporter.on_retention_removed(&path);
            outcome.removed.push(path);
        }
        Err(err) => {
            warn!("Failed to remove {}: {}", path.display(), err);
            outcome
                .errors
                .push(format!("retention: remove {}: {}", path.display(), err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_selection() {
        assert_eq!(RetentionPolicy::select(3, 30), RetentionPolicy::KeepLastN(3));
        assert_eq!(RetentionPolicy::select(0, 30), RetentionPolicy::AgeCutoff(30));
        assert_eq!(RetentionPolicy::select(-1, 30), RetentionPolicy::AgeCutoff(30));
        assert_eq!(RetentionPolicy::select(0, 0), RetentionPolicy::Disabled);
        assert_eq!(RetentionPolicy::select(0, -4), RetentionPolicy::Disabled);
    }

    #[test]
    fn test_container_extensions() {
        assert!(is_container(Path::new("/a/logs_202401.zip")));
        assert!(is_container(Path::new("/a/LOGS_202401.ZIP")));
        assert!(is_container(Path::new("/a/u_ex240101.gz")));
        assert!(!is_container(Path::new("/a/notes.txt")));
        assert!(!is_container(Path::new("/a/zip")));
    }
}
