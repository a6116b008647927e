use chrono::{DateTime, Local, TimeZone};
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;

use log_archiver_core::archive::builder::{build_group_archive, create_container, ContainerSink};
use log_archiver_core::archive::delete::{delete_verified, RetryPolicy};
use log_archiver_core::archive::verify::{verify_container, zip_entry_sizes};
use log_archiver_core::stats::SharedStats;
use log_archiver_core::{
    ArchiveReporter, CandidateFile, CompressionKind, Group, RunStatistics, SilentReporter,
};

fn at(y: i32, m: u32, d: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap()
}

fn candidate(path: &Path, modified: DateTime<Local>) -> CandidateFile {
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    CandidateFile {
        path: path.to_path_buf(),
        size,
        modified,
    }
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        delay: Duration::from_millis(1),
    }
}

#[derive(Default)]
struct RecordingReporter {
    added: Mutex<Vec<PathBuf>>,
}

impl ArchiveReporter for RecordingReporter {
    fn on_file_added(&self, _container: &Path, source: &Path) {
        self.added.lock().unwrap().push(source.to_path_buf());
    }
}

/// Five members, one of which vanished between scan and archive.
fn five_member_group(dir: &Path) -> (Group, PathBuf) {
    let mut files = Vec::new();
    let mut missing = PathBuf::new();
    for i in 1..=5u32 {
        let path = dir.join(format!("u_ex2401{:02}.log", i));
        if i == 3 {
            missing = path.clone();
            files.push(CandidateFile {
                path,
                size: 42,
                modified: at(2024, 1, i),
            });
            continue;
        }
        fs::write(&path, "entry\n".repeat(i as usize)).unwrap();
        files.push(candidate(&path, at(2024, 1, i)));
    }
    (
        Group {
            key: "2024-01".to_string(),
            files,
        },
        missing,
    )
}

#[test]
fn test_missing_member_is_skipped_and_rest_deleted() {
    let tmp = tempdir().unwrap();
    let source = tmp.path().join("source");
    let dest = tmp.path().join("archive");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&dest).unwrap();
    let (group, missing) = five_member_group(&source);

    let stats = SharedStats::new(RunStatistics::new(Local::now()));
    let reporter = RecordingReporter::default();
    let (file, container) = create_container(&dest, "logs_202401.zip", CompressionKind::Zip).unwrap();
    let record = build_group_archive(&group, file, &container, &stats, &reporter).unwrap();

    assert_eq!(record.sources.len(), 4);
    assert!(!record.sources.contains(&missing));
    assert_eq!(reporter.added.lock().unwrap().len(), 4);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.errors.len(), 1);
    assert!(snapshot.errors[0].starts_with("open "));
    assert!(snapshot.errors[0].contains("u_ex240103.log"));

    let entries = zip_entry_sizes(&container).unwrap();
    assert_eq!(entries.len(), 4);
    assert!(!entries.contains_key("u_ex240103.log"));

    let verification = verify_container(&record).unwrap();
    assert_eq!(verification.verified_count(), 4);
    assert!(!verification.is_verified(&missing));

    let report = delete_verified(&verification, &quick_retry());
    assert_eq!(report.deleted.len(), 4);
    assert!(report.failed.is_empty());
    for path in &record.sources {
        assert!(!path.exists());
    }
}

#[test]
fn test_size_change_after_archiving_blocks_deletion() {
    let tmp = tempdir().unwrap();
    let dest = tmp.path().join("archive");
    fs::create_dir_all(&dest).unwrap();
    let stable = tmp.path().join("stable.log");
    let growing = tmp.path().join("growing.log");
    fs::write(&stable, "a\nb\n").unwrap();
    fs::write(&growing, "a\n").unwrap();

    let group = Group {
        key: "2024-01".to_string(),
        files: vec![candidate(&stable, at(2024, 1, 1)), candidate(&growing, at(2024, 1, 2))],
    };
    let stats = SharedStats::new(RunStatistics::new(Local::now()));
    let (file, container) = create_container(&dest, "logs.zip", CompressionKind::Zip).unwrap();
    let record = build_group_archive(&group, file, &container, &stats, &SilentReporter).unwrap();

    // A writer appends after the container was closed.
    fs::write(&growing, "a\nb\nc\n").unwrap();

    let verification = verify_container(&record).unwrap();
    assert!(verification.is_verified(&stable));
    assert!(!verification.is_verified(&growing));

    let report = delete_verified(&verification, &quick_retry());
    assert_eq!(report.deleted, vec![stable.clone()]);
    assert!(growing.exists());
}

#[test]
fn test_unreadable_container_verifies_nothing() {
    let tmp = tempdir().unwrap();
    let dest = tmp.path().join("archive");
    fs::create_dir_all(&dest).unwrap();
    let source = tmp.path().join("a.log");
    fs::write(&source, "line\n").unwrap();

    let group = Group {
        key: "2024-01".to_string(),
        files: vec![candidate(&source, at(2024, 1, 1))],
    };
    let stats = SharedStats::new(RunStatistics::new(Local::now()));
    let (file, container) = create_container(&dest, "logs.zip", CompressionKind::Zip).unwrap();
    let record = build_group_archive(&group, file, &container, &stats, &SilentReporter).unwrap();

    // Corrupt the container after it was closed.
    fs::write(&container, b"not a zip").unwrap();

    assert!(verify_container(&record).is_err());
    let verification = log_archiver_core::model::VerificationResult::all_unverified(&record);
    let report = delete_verified(&verification, &quick_retry());
    assert!(report.deleted.is_empty());
    assert!(source.exists());
}

/// A container file on a volume that runs out of space at `limit` bytes.
struct FillingVolume {
    file: File,
    limit: u64,
    fail_sync: bool,
}

impl Write for FillingVolume {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let position = self.file.stream_position()?;
        if position + buf.len() as u64 > self.limit {
            return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FillingVolume {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl ContainerSink for FillingVolume {
    fn sync(&mut self) -> io::Result<()> {
        if self.fail_sync {
            return Err(io::Error::new(io::ErrorKind::Other, "flush to disk failed"));
        }
        self.file.sync_all()
    }
}

/// Bytes that deflate cannot shrink much.
fn noise(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 56) as u8
        })
        .collect()
}

#[test]
fn test_write_failure_mid_copy_never_records_the_member() {
    let tmp = tempdir().unwrap();
    let dest = tmp.path().join("archive");
    fs::create_dir_all(&dest).unwrap();
    let small = tmp.path().join("small.log");
    let big = tmp.path().join("big.log");
    fs::write(&small, "GET / 200\n".repeat(10)).unwrap();
    fs::write(&big, noise(1024 * 1024)).unwrap();

    let group = Group {
        key: "2024-01".to_string(),
        files: vec![candidate(&small, at(2024, 1, 1)), candidate(&big, at(2024, 1, 2))],
    };
    let stats = SharedStats::new(RunStatistics::new(Local::now()));
    let (file, container) = create_container(&dest, "logs.zip", CompressionKind::Zip).unwrap();
    let sink = FillingVolume {
        file,
        limit: 4096,
        fail_sync: false,
    };

    let result = build_group_archive(&group, sink, &container, &stats, &SilentReporter);

    let errors = stats.snapshot().errors;
    assert!(
        errors
            .iter()
            .any(|e| e.starts_with("zip copy") && e.contains("big.log")),
        "errors: {:?}",
        errors
    );
    match result {
        // The partial entry was dropped and the earlier member survived.
        Ok(record) => {
            assert_eq!(record.sources, vec![small.clone()]);
            assert!(zip_entry_sizes(&container).unwrap().contains_key("small.log"));
        }
        // The writer could not recover; nothing half-written is left behind.
        Err(_) => assert!(!container.exists()),
    }
    assert!(small.exists() && big.exists());
}

#[test]
fn test_close_failure_removes_container_and_fails_group() {
    let tmp = tempdir().unwrap();
    let dest = tmp.path().join("archive");
    fs::create_dir_all(&dest).unwrap();
    let source = tmp.path().join("a.log");
    fs::write(&source, "line\n").unwrap();

    let group = Group {
        key: "2024-01".to_string(),
        files: vec![candidate(&source, at(2024, 1, 1))],
    };
    let stats = SharedStats::new(RunStatistics::new(Local::now()));
    let (file, container) = create_container(&dest, "logs.zip", CompressionKind::Zip).unwrap();
    let sink = FillingVolume {
        file,
        limit: u64::MAX,
        fail_sync: true,
    };

    let err = build_group_archive(&group, sink, &container, &stats, &SilentReporter).unwrap_err();

    assert!(err.to_string().starts_with("closing container"));
    assert!(err.to_string().contains("flush to disk failed"));
    assert!(!container.exists());
    assert!(stats.snapshot().errors.is_empty());
    assert!(source.exists());
}
