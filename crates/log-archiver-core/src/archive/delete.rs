use crate::model::VerificationResult;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed-count, fixed-delay retry for removing originals that another process
/// may briefly hold open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or `attempts` runs are used up, sleeping `delay`
    /// between runs. Returns the last error.
    pub fn run<F>(&self, mut op: F) -> io::Result<()>
    where
        F: FnMut() -> io::Result<()>,
    {
        let attempts = self.attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op() {
                Ok(()) => return Ok(()),
                Err(err) => {
                    last_err = Some(err);
                    if attempt < attempts {
                        thread::sleep(self.delay);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no attempts made")))
    }
}

pub fn delete_with_retry(path: &Path, policy: &RetryPolicy) -> io::Result<()> {
    policy.run(|| fs::remove_file(path))
}

#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, io::Error)>,
}

/// Remove the originals the verifier confirmed, and nothing else.
pub fn delete_verified(verification: &VerificationResult, policy: &RetryPolicy) -> DeletionReport {
    let mut report = DeletionReport::default();
    for path in verification.verified_paths() {
        match delete_with_retry(path, policy) {
            Ok(()) => {
                info!("Removed original {}", path.display());
                report.deleted.push(path.to_path_buf());
            }
            Err(err) => {
                warn!(
                    "Failed to remove original file {} after {} attempts: {}",
                    path.display(),
                    policy.attempts,
                    err
                );
                report.failed.push((path.to_path_buf(), err));
            }
        }
    }
    report
}
