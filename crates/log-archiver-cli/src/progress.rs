use indicatif::{ProgressBar, ProgressStyle};
use log_archiver_core::ArchiveReporter;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using an indicatif bar over the group count.
///
/// Groups finish in any order, so the bar counts completions rather than
/// tracking a position per group.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(pb) = self.lock().as_ref() {
            f(pb);
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl ArchiveReporter for CliReporter {
    fn on_scan_complete(&self, candidates: usize, groups: usize) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} log files in {} groups",
            candidates, groups
        );
        if groups == 0 {
            return;
        }

        let pb = ProgressBar::new(groups as u64);
        let style = ProgressStyle::with_template(
            "  {spinner:.cyan} Archiving [{bar:30.cyan/dim}] {pos}/{len} groups {msg}",
        )
        .map(|s| s.progress_chars("━╸─").tick_chars(TICK_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));

        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn on_group_start(&self, key: &str, files: usize) {
        self.with_bar(|pb| pb.set_message(format!("{} ({} files)", key, files)));
    }

    fn on_file_added(&self, _container: &Path, source: &Path) {
        let name = file_name(source);
        self.with_bar(|pb| pb.set_message(name));
    }

    fn on_group_complete(&self, key: &str, archived: usize) {
        self.with_bar(|pb| {
            pb.println(format!(
                "  \x1b[32m✓\x1b[0m {}: {} files archived",
                key, archived
            ));
            pb.inc(1);
        });
    }

    fn on_group_failed(&self, key: &str, error: &str) {
        self.with_bar(|pb| {
            pb.println(format!("  \x1b[31m✗\x1b[0m {}: {}", key, error));
            pb.inc(1);
        });
    }

    fn on_retention_removed(&self, path: &Path) {
        self.finish();
        eprintln!("  \x1b[33m-\x1b[0m Removed old archive {}", path.display());
    }
}
