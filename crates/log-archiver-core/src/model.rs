use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A log file found by the scanner that is old enough to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Local>,
}

/// Candidate files sharing one calendar period.
#[derive(Debug, Clone)]
pub struct Group {
    /// `YYYY-MM` for monthly scope, `YYYY-MM-DD` for daily scope.
    pub key: String,
    pub files: Vec<CandidateFile>,
}

impl Group {
    /// The time the container name is resolved against: the oldest member's mtime.
    pub fn reference_time(&self) -> Option<DateTime<Local>> {
        self.files.first().map(|f| f.modified)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveScope {
    Monthly,
    Daily,
}

impl ArchiveScope {
    /// Unknown values fall back to monthly.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "daily" => ArchiveScope::Daily,
            _ => ArchiveScope::Monthly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveScope::Monthly => "monthly",
            ArchiveScope::Daily => "daily",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// One container per period.
    Grouped,
    /// One container per source file.
    PerFile,
}

impl ArchiveMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "per_file" => ArchiveMode::PerFile,
            _ => ArchiveMode::Grouped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveMode::Grouped => "grouped",
            ArchiveMode::PerFile => "per_file",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// Multi-file zip container.
    Zip,
    /// Single gzip stream, only usable for one file per container.
    Gzip,
}

/// Extensions the retention manager treats as containers.
pub const CONTAINER_EXTENSIONS: [&str; 2] = ["zip", "gz"];

impl CompressionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "zip" => Some(CompressionKind::Zip),
            "gzip" | "gz" => Some(CompressionKind::Gzip),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CompressionKind::Zip => ".zip",
            CompressionKind::Gzip => ".gz",
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionKind::Zip => write!(f, "zip"),
            CompressionKind::Gzip => write!(f, "gzip"),
        }
    }
}

/// A closed container and the sources that made it in.
#[derive(Debug, Clone)]
pub struct ArchiveRecord {
    pub container: PathBuf,
    pub kind: CompressionKind,
    pub sources: Vec<PathBuf>,
    /// Sum of the scanned sizes of `sources`.
    pub bytes_in: u64,
}

/// Per-source outcome of the integrity check. Absent paths count as unverified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    entries: BTreeMap<PathBuf, bool>,
}

impl VerificationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_unverified(record: &ArchiveRecord) -> Self {
        let mut result = Self::new();
        for source in &record.sources {
            result.set(source.clone(), false);
        }
        result
    }

    pub fn set(&mut self, path: PathBuf, verified: bool) {
        self.entries.insert(path, verified);
    }

    pub fn is_verified(&self, path: &Path) -> bool {
        self.entries.get(path).copied().unwrap_or(false)
    }

    pub fn verified_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(|(_, ok)| **ok)
            .map(|(path, _)| path.as_path())
    }

    pub fn verified_count(&self) -> usize {
        self.entries.values().filter(|ok| **ok).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
