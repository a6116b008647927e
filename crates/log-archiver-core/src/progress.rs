use std::path::Path;

/// Trait for reporting archive progress.
///
/// The CLI implements it with indicatif; tests use `SilentReporter`.
/// Group callbacks arrive from worker threads in any order.
/// All methods have default no-op implementations.
pub trait ArchiveReporter: Send + Sync {
    fn on_scan_complete(&self, _candidates: usize, _groups: usize) {}
    fn on_group_start(&self, _key: &str, _files: usize) {}
    fn on_file_added(&self, _container: &Path, _source: &Path) {}
    fn on_original_removed(&self, _source: &Path) {}
    fn on_group_complete(&self, _key: &str, _archived: usize) {}
    fn on_group_failed(&self, _key: &str, _error: &str) {}
    fn on_retention_removed(&self, _path: &Path) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ArchiveReporter for SilentReporter {}
