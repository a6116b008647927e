use crate::archive::delete::RetryPolicy;
use crate::error::Error;
use crate::model::{ArchiveMode, ArchiveScope, CompressionKind};
use crate::retention::RetentionPolicy;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_AGE_DAYS: u64 = 7;
pub const DEFAULT_NAME_PATTERN: &str = "logs_%Y%m%d_%H%M%S";

/// Settings as they appear in the configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub source_folder: String,
    pub dest_folder: String,
    pub log_age_days: i64,
    pub retention_days: i64,
    #[serde(alias = "cleanup_old_logs")]
    pub cleanup_old_archives: bool,
    pub delete_original_after_compress: bool,
    pub compress_current_month: bool,
    pub archive_scope: String,
    pub archive_mode: String,
    pub keep_last_n_archives: i64,
    pub dest_file_name_pattern: String,
    pub compression_type: String,
    pub max_cpus: i64,
    pub ignore_patterns: Vec<String>,
    pub report_dir: Option<String>,
}

/// Load `config.{json,toml,yaml}` from the working directory (or `path` when given),
/// then apply `LOG_ARCHIVER_*` environment overrides.
pub fn load_configuration(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file_source = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("config").required(false),
    };
    let builder = Config::builder()
        .add_source(file_source)
        .add_source(Environment::with_prefix("LOG_ARCHIVER").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Validated settings the engine runs with.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub min_age_days: u64,
    pub scope: ArchiveScope,
    pub mode: ArchiveMode,
    /// Only honoured for monthly scope.
    pub include_current_period: bool,
    pub name_pattern: String,
    pub compression: CompressionKind,
    pub delete_after_verify: bool,
    pub cleanup_enabled: bool,
    pub retention: RetentionPolicy,
    pub ignore_patterns: Vec<String>,
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl ArchiveSettings {
    pub fn new(source_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            min_age_days: DEFAULT_LOG_AGE_DAYS,
            scope: ArchiveScope::Monthly,
            mode: ArchiveMode::Grouped,
            include_current_period: false,
            name_pattern: DEFAULT_NAME_PATTERN.to_string(),
            compression: CompressionKind::Zip,
            delete_after_verify: false,
            cleanup_enabled: false,
            retention: RetentionPolicy::Disabled,
            ignore_patterns: Vec::new(),
            workers: available_workers(),
            retry: RetryPolicy::default(),
        }
    }
}

pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl AppConfig {
    pub fn validate(&self) -> Result<ArchiveSettings, Error> {
        if self.source_folder.trim().is_empty() {
            return Err(Error::InvalidSettings("source_folder is required".to_string()));
        }
        if self.dest_folder.trim().is_empty() {
            return Err(Error::InvalidSettings("dest_folder is required".to_string()));
        }

        let compression = CompressionKind::parse(&self.compression_type).ok_or_else(|| {
            Error::InvalidSettings(format!(
                "unsupported compression_type '{}' (supported: zip, gzip)",
                self.compression_type
            ))
        })?;

        let mut settings = ArchiveSettings::new(&self.source_folder, &self.dest_folder);
        if self.log_age_days > 0 {
            settings.min_age_days = self.log_age_days as u64;
        }
        settings.scope = ArchiveScope::parse(&self.archive_scope);
        settings.mode = ArchiveMode::parse(&self.archive_mode);
        settings.include_current_period = self.compress_current_month;
        if !self.dest_file_name_pattern.trim().is_empty() {
            settings.name_pattern = self.dest_file_name_pattern.clone();
        }
        settings.compression = compression;
        settings.delete_after_verify = self.delete_original_after_compress;
        settings.cleanup_enabled = self.cleanup_old_archives;
        settings.retention =
            RetentionPolicy::select(self.keep_last_n_archives, self.retention_days);
        settings.ignore_patterns = self.ignore_patterns.clone();

        let available = available_workers();
        if self.max_cpus > 0 && self.max_cpus as usize <= available {
            settings.workers = self.max_cpus as usize;
        } else {
            settings.workers = available;
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            source_folder: "/var/log/iis".to_string(),
            dest_folder: "/srv/archive".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let settings = minimal().validate().unwrap();
        assert_eq!(settings.min_age_days, 7);
        assert_eq!(settings.scope, ArchiveScope::Monthly);
        assert_eq!(settings.mode, ArchiveMode::Grouped);
        assert_eq!(settings.compression, CompressionKind::Zip);
        assert_eq!(settings.name_pattern, "logs_%Y%m%d_%H%M%S");
        assert_eq!(settings.retention, RetentionPolicy::Disabled);
        assert!(settings.workers >= 1);
    }

    #[test]
    fn test_validate_requires_folders() {
        let config = AppConfig {
            dest_folder: String::new(),
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidSettings(_))));

        let config = AppConfig {
            source_folder: "  ".to_string(),
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidSettings(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_compression() {
        let config = AppConfig {
            compression_type: "rar".to_string(),
            ..minimal()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_values_are_clamped() {
        let config = AppConfig {
            log_age_days: -3,
            retention_days: -1,
            keep_last_n_archives: -5,
            max_cpus: -2,
            archive_scope: "yearly".to_string(),
            ..minimal()
        };
        let settings = config.validate().unwrap();
        assert_eq!(settings.min_age_days, 7);
        assert_eq!(settings.retention, RetentionPolicy::Disabled);
        assert_eq!(settings.scope, ArchiveScope::Monthly);
        assert_eq!(settings.workers, available_workers());
    }

    #[test]
    fn test_max_cpus_within_range_is_used() {
        let config = AppConfig {
            max_cpus: 1,
            ..minimal()
        };
        assert_eq!(config.validate().unwrap().workers, 1);
    }

    #[test]
    fn test_keep_last_n_wins_over_age() {
        let config = AppConfig {
            keep_last_n_archives: 4,
            retention_days: 30,
            cleanup_old_archives: true,
            ..minimal()
        };
        let settings = config.validate().unwrap();
        assert_eq!(settings.retention, RetentionPolicy::KeepLastN(4));
        assert!(settings.cleanup_enabled);
    }
}
