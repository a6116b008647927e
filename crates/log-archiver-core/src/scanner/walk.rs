use crate::error::Error;
use crate::model::CandidateFile;
use crate::period::days_before;
use chrono::{DateTime, Local};
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error};

/// Parallel directory traversal. Collects log files last modified at or before
/// `now - min_age_days`, oldest first.
///
/// Any traversal error aborts the scan; no partial list is returned. Symlinks are
/// not followed and directories matching an ignore glob are pruned.
pub fn scan_log_files(
    root: &Path,
    min_age_days: u64,
    ignore_globs: &[String],
    now: &DateTime<Local>,
) -> Result<Vec<CandidateFile>, Error> {
    let root_metadata = fs::metadata(root).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Error reading source directory {}: {}", root.display(), err),
        )
    })?;
    if !root_metadata.is_dir() {
        return Err(Error::InvalidSettings(format!(
            "source directory {} is not a directory",
            root.display()
        )));
    }

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let cutoff = days_before(now, min_age_days);
    let found = Mutex::new(Vec::new());
    visit_dirs(root, cutoff, &found, &ignore_patterns)?;

    let mut candidates = found
        .into_inner()
        .map_err(|_| Error::Other("scanner result lock poisoned".to_string()))?;
    candidates.sort_by(|a: &CandidateFile, b| {
        a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path))
    });
    debug!(
        "Found {} candidate log files under {}",
        candidates.len(),
        root.display()
    );
    Ok(candidates)
}

/// `.log` / `.txt` extensions, or "log" anywhere in the path, case-insensitive.
pub fn is_log_file(path: &Path) -> bool {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    extension == "log"
        || extension == "txt"
        || path.to_string_lossy().to_lowercase().contains("log")
}

fn visit_dirs(
    dir: &Path,
    cutoff: DateTime<Local>,
    found: &Mutex<Vec<CandidateFile>>,
    ignore_patterns: &[Pattern],
) -> Result<(), Error> {
    let entries = fs::read_dir(dir).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Error reading directory {}: {}", dir.display(), err),
        )
    })?;

    entries.par_bridge().try_for_each(|entry_result| {
        let entry = entry_result.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!(
                    "Error reading entry in directory {}: {}",
                    dir.display(),
                    err
                ),
            )
        })?;

        let path = entry.path();
        if ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(&path))
        {
            return Ok(());
        }

        let metadata = fs::symlink_metadata(&path).map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error getting metadata for {}: {}", path.display(), err),
            )
        })?;

        if metadata.is_dir() {
            visit_dirs(&path, cutoff, found, ignore_patterns)?;
        } else if metadata.is_file() && is_log_file(&path) {
            let modified: DateTime<Local> = metadata
                .modified()
                .map_err(|err| {
                    io::Error::new(
                        err.kind(),
                        format!(
                            "Error reading modification time of {}: {}",
                            path.display(),
                            err
                        ),
                    )
                })?
                .into();
            if modified <= cutoff {
                let candidate = CandidateFile {
                    path,
                    size: metadata.len(),
                    modified,
                };
                found
                    .lock()
                    .map_err(|_| Error::Other("scanner result lock poisoned".to_string()))?
                    .push(candidate);
            }
        }
        Ok::<_, Error>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_heuristic() {
        assert!(is_log_file(Path::new("/srv/w3svc1/u_ex240101.log")));
        assert!(is_log_file(Path::new("/srv/w3svc1/U_EX240101.LOG")));
        assert!(is_log_file(Path::new("/srv/data/notes.txt")));
        assert!(is_log_file(Path::new("/srv/LogFiles/W3SVC1/u_ex240101.bak")));
        assert!(is_log_file(Path::new("/srv/data/catalog.csv")));
        assert!(!is_log_file(Path::new("/srv/data/report.csv")));
        assert!(!is_log_file(Path::new("/srv/data/image.png")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("logs");
        let outside = tmp.path().join("elsewhere");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(outside.join("nested")).unwrap();
        fs::write(root.join("real.log"), "line\n").unwrap();
        fs::write(outside.join("target.log"), "line\n").unwrap();
        fs::write(outside.join("nested/inner.log"), "line\n").unwrap();
        symlink(outside.join("target.log"), root.join("linked.log")).unwrap();
        symlink(outside.join("nested"), root.join("linked_dir")).unwrap();

        // Zero age and a cutoff in the future: only the link check can exclude a file.
        let now = Local::now() + chrono::Duration::days(1);
        let found = scan_log_files(&root, 0, &[], &now).unwrap();

        let paths: Vec<_> = found.iter().map(|c| c.path.clone()).collect();
        assert_eq!(paths, vec![root.join("real.log")]);
    }
}
