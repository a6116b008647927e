use chrono::{DateTime, Local};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Totals for one run, produced by the engine and consumed by the summary and report.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub files_processed: usize,
    pub files_archived: usize,
    pub files_deleted: usize,
    pub containers_created: usize,
    pub containers_removed: usize,
    pub total_size_before: u64,
    pub total_size_after: u64,
    pub group_count: usize,
    pub workers: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

impl RunStatistics {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            files_processed: 0,
            files_archived: 0,
            files_deleted: 0,
            containers_created: 0,
            containers_removed: 0,
            total_size_before: 0,
            total_size_after: 0,
            group_count: 0,
            workers: 0,
            errors: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    pub fn finish(&mut self, finished_at: DateTime<Local>) {
        self.finished_at = Some(finished_at);
    }

    pub fn duration(&self) -> Duration {
        self.finished_at
            .and_then(|end| (end - self.started_at).to_std().ok())
            .unwrap_or_default()
    }

    /// Percentage saved relative to the input size, if anything was archived.
    pub fn compression_ratio(&self) -> Option<f64> {
        if self.total_size_before == 0 {
            return None;
        }
        let saved = self.total_size_before as f64 - self.total_size_after as f64;
        Some(saved / self.total_size_before as f64 * 100.0)
    }

    pub fn throughput_mb_per_sec(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs <= 0.0 || self.total_size_before == 0 {
            return 0.0;
        }
        (self.total_size_before as f64 / (1024.0 * 1024.0)) / secs
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// The one piece of state shared between group tasks. Every method takes the
/// lock for a single update and releases it before returning.
#[derive(Debug)]
pub struct SharedStats {
    inner: Mutex<RunStatistics>,
}

impl SharedStats {
    pub fn new(stats: RunStatistics) -> Self {
        Self {
            inner: Mutex::new(stats),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunStatistics> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.lock().errors.push(message.into());
    }

    pub fn set_group_count(&self, count: usize) {
        self.lock().group_count = count;
    }

    pub fn set_workers(&self, workers: usize) {
        self.lock().workers = workers;
    }

    /// Commit the counters of one closed container.
    pub fn record_container(&self, files: usize, bytes_in: u64, bytes_out: u64) {
        let mut stats = self.lock();
        stats.files_processed += files;
        stats.files_archived += files;
        stats.total_size_before += bytes_in;
        stats.total_size_after += bytes_out;
        stats.containers_created += 1;
    }

    pub fn record_deleted(&self, count: usize) {
        self.lock().files_deleted += count;
    }

    pub fn record_retention(&self, removed: usize, errors: Vec<String>) {
        let mut stats = self.lock();
        stats.containers_removed += removed;
        stats.errors.extend(errors);
    }

    pub fn snapshot(&self) -> RunStatistics {
        self.lock().clone()
    }

    pub fn into_inner(self) -> RunStatistics {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_parallel_updates_are_not_lost() {
        let shared = SharedStats::new(RunStatistics::new(Local::now()));

        (0..200).into_par_iter().for_each(|i| {
            shared.record_container(2, 100, 40);
            if i % 10 == 0 {
                shared.record_error(format!("error {}", i));
            }
        });

        let stats = shared.into_inner();
        assert_eq!(stats.files_archived, 400);
        assert_eq!(stats.files_processed, 400);
        assert_eq!(stats.total_size_before, 20_000);
        assert_eq!(stats.total_size_after, 8_000);
        assert_eq!(stats.containers_created, 200);
        assert_eq!(stats.errors.len(), 20);
    }

    #[test]
    fn test_compression_ratio() {
        let mut stats = RunStatistics::new(Local::now());
        assert_eq!(stats.compression_ratio(), None);
        stats.total_size_before = 1000;
        stats.total_size_after = 250;
        assert_eq!(stats.compression_ratio(), Some(75.0));
    }
}
