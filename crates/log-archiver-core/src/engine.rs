use crate::archive::{builder, delete, verify};
use crate::config::ArchiveSettings;
use crate::error::Error;
use crate::model::{
    ArchiveMode, ArchiveRecord, CandidateFile, CompressionKind, Group, VerificationResult,
};
use crate::naming;
use crate::period;
use crate::progress::ArchiveReporter;
use crate::retention::{self, RetentionOutcome, RetentionPolicy};
use crate::scanner;
use crate::stats::{RunStatistics, SharedStats};
use chrono::{DateTime, Local};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::io;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs one archive pass: scan, group, archive each group on a bounded worker
/// pool, then sweep the destination under the retention policy.
pub struct ArchiveEngine {
    settings: ArchiveSettings,
}

impl ArchiveEngine {
    pub fn new(settings: ArchiveSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ArchiveSettings {
        &self.settings
    }

    pub fn run(&self, reporter: &dyn ArchiveReporter) -> RunStatistics {
        self.run_at(Local::now(), reporter)
    }

    /// Same as [`run`](Self::run) with `now` deciding age cutoffs, the current
    /// period and per-file container names.
    ///
    /// Always returns statistics: a fatal archive-phase error is recorded in
    /// `errors` and retention still runs.
    pub fn run_at(&self, now: DateTime<Local>, reporter: &dyn ArchiveReporter) -> RunStatistics {
        let shared = SharedStats::new(RunStatistics::new(Local::now()));
        shared.set_workers(self.settings.workers);

        if let Err(err) = self.archive_pass(&now, &shared, reporter) {
            error!("Error processing logs: {}", err);
            shared.record_error(err.to_string());
        }

        if self.settings.cleanup_enabled {
            match self.prune_at(&now, reporter) {
                Ok(outcome) => shared.record_retention(outcome.removed.len(), outcome.errors),
                Err(err) => {
                    error!("Error cleaning up old archives: {}", err);
                    shared.record_error(format!("Error cleaning up old archives: {}", err));
                }
            }
        }

        let mut stats = shared.into_inner();
        stats.finish(Local::now());
        stats
    }

    /// Scan and group without touching the filesystem.
    pub fn plan(&self, now: &DateTime<Local>) -> Result<Vec<Group>, Error> {
        let candidates = self.scan(now)?;
        Ok(self.group(candidates, now))
    }

    /// Apply the retention policy to the destination directory on its own.
    pub fn prune_at(
        &self,
        now: &DateTime<Local>,
        reporter: &dyn ArchiveReporter,
    ) -> Result<RetentionOutcome, Error> {
        let policy = self.settings.retention;
        if policy == RetentionPolicy::Disabled {
            debug!("Retention disabled");
            return Ok(RetentionOutcome::default());
        }
        info!(
            "Applying retention ({}) to {}",
            policy.describe(),
            self.settings.dest_dir.display()
        );
        let outcome = retention::apply_retention(&self.settings.dest_dir, policy, now, reporter)?;
        info!(
            "Retention removed {} files ({} errors)",
            outcome.removed.len(),
            outcome.errors.len()
        );
        Ok(outcome)
    }

    fn scan(&self, now: &DateTime<Local>) -> Result<Vec<CandidateFile>, Error> {
        let scan_start = Instant::now();
        let candidates = scanner::scan_log_files(
            &self.settings.source_dir,
            self.settings.min_age_days,
            &self.settings.ignore_patterns,
            now,
        )
        .map_err(|err| Error::Other(format!("failed to find log files: {}", err)))?;
        debug!(
            "Scan completed in {:.2}s, {} candidates",
            scan_start.elapsed().as_secs_f64(),
            candidates.len()
        );
        Ok(candidates)
    }

    fn group(&self, candidates: Vec<CandidateFile>, now: &DateTime<Local>) -> Vec<Group> {
        period::group_by_period(
            candidates,
            self.settings.scope,
            self.settings.include_current_period,
            now,
        )
    }

    fn archive_pass(
        &self,
        now: &DateTime<Local>,
        stats: &SharedStats,
        reporter: &dyn ArchiveReporter,
    ) -> Result<(), Error> {
        fs::create_dir_all(&self.settings.dest_dir).map_err(|err| {
            io::Error::new(
                err.kind(),
                format!(
                    "failed to create destination folder {}: {}",
                    self.settings.dest_dir.display(),
                    err
                ),
            )
        })?;

        let candidates = self.scan(now)?;
        if candidates.is_empty() {
            info!("No log files found matching criteria");
            reporter.on_scan_complete(0, 0);
            return Ok(());
        }
        info!("Found {} log files to process", candidates.len());

        let candidate_count = candidates.len();
        let groups = self.group(candidates, now);
        stats.set_group_count(groups.len());
        reporter.on_scan_complete(candidate_count, groups.len());
        info!(
            "Archiving {} {} groups on {} workers",
            groups.len(),
            self.settings.scope.as_str(),
            self.settings.workers
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.max(1))
            .thread_name(|i| format!("archive-worker-{}", i))
            .build()?;

        let archive_start = Instant::now();
        pool.install(|| {
            groups
                .par_iter()
                .for_each(|group| self.process_group(group, now, stats, reporter));
        });
        debug!(
            "Archive phase completed in {:.2}s",
            archive_start.elapsed().as_secs_f64()
        );

        Ok(())
    }

    fn process_group(
        &self,
        group: &Group,
        now: &DateTime<Local>,
        stats: &SharedStats,
        reporter: &dyn ArchiveReporter,
    ) {
        reporter.on_group_start(&group.key, group.files.len());
        let result = match self.settings.mode {
            ArchiveMode::Grouped => self.archive_group(group, stats, reporter),
            ArchiveMode::PerFile => Ok(self.archive_each_file(group, now, stats, reporter)),
        };
        match result {
            Ok(archived) => reporter.on_group_complete(&group.key, archived),
            Err(err) => {
                let message = format!("Error compressing group {}: {}", group.key, err);
                error!("{}", message);
                stats.record_error(message);
                reporter.on_group_failed(&group.key, &err.to_string());
            }
        }
    }

    fn archive_group(
        &self,
        group: &Group,
        stats: &SharedStats,
        reporter: &dyn ArchiveReporter,
    ) -> Result<usize, Error> {
        if self.settings.compression != CompressionKind::Zip {
            return Err(Error::UnsupportedCompression(format!(
                "grouped mode requires zip compression; {} not supported for grouped archive",
                self.settings.compression
            )));
        }
        let Some(reference) = group.reference_time() else {
            return Ok(0);
        };

        let name = naming::group_container_name(
            &self.settings.name_pattern,
            &reference,
            self.settings.scope,
            CompressionKind::Zip,
        );
        let (file, container) =
            builder::create_container(&self.settings.dest_dir, &name, CompressionKind::Zip)?;
        let record = builder::build_group_archive(group, file, &container, stats, reporter)?;

        if record.sources.is_empty() {
            warn!(
                "No files of group {} could be archived, removing empty {}",
                group.key,
                container.display()
            );
            if let Err(err) = fs::remove_file(&container) {
                warn!("Failed to remove {}: {}", container.display(), err);
            }
            return Ok(0);
        }

        Ok(self.verify_and_clean(record, stats, reporter))
    }

    fn archive_each_file(
        &self,
        group: &Group,
        now: &DateTime<Local>,
        stats: &SharedStats,
        reporter: &dyn ArchiveReporter,
    ) -> usize {
        let mut archived = 0;
        for candidate in &group.files {
            match self.archive_single(candidate, now, reporter) {
                Ok(record) => archived += self.verify_and_clean(record, stats, reporter),
                Err(err) => {
                    let message = format!("compress {}: {}", candidate.path.display(), err);
                    warn!("{}", message);
                    stats.record_error(message);
                }
            }
        }
        archived
    }

    fn archive_single(
        &self,
        candidate: &CandidateFile,
        now: &DateTime<Local>,
        reporter: &dyn ArchiveReporter,
    ) -> Result<ArchiveRecord, Error> {
        let kind = self.settings.compression;
        let stem = candidate
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        let name = naming::file_container_name(&self.settings.name_pattern, now, &stem, kind);
        let (file, container) = builder::create_container(&self.settings.dest_dir, &name, kind)?;
        builder::build_single_archive(candidate, kind, file, &container, reporter)
    }

    /// Verify a closed container, commit its counters, then remove verified
    /// originals if configured. Returns the number of files in the container.
    fn verify_and_clean(
        &self,
        record: ArchiveRecord,
        stats: &SharedStats,
        reporter: &dyn ArchiveReporter,
    ) -> usize {
        let verification = match verify::verify_container(&record) {
            Ok(verification) => verification,
            Err(err) => {
                let message = format!(
                    "verify open container {}: {}",
                    record.container.display(),
                    err
                );
                warn!("{}", message);
                stats.record_error(message);
                VerificationResult::all_unverified(&record)
            }
        };

        let bytes_out = fs::metadata(&record.container)
            .map(|m| m.len())
            .unwrap_or(0);
        stats.record_container(record.sources.len(), record.bytes_in, bytes_out);

        if self.settings.delete_after_verify {
            let report = delete::delete_verified(&verification, &self.settings.retry);
            for path in &report.deleted {
                reporter.on_original_removed(path);
            }
            stats.record_deleted(report.deleted.len());
            for (path, err) in report.failed {
                stats.record_error(format!("remove original {}: {}", path.display(), err));
            }
        }

        record.sources.len()
    }
}
