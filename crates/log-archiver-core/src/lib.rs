pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod naming;
pub mod period;
pub mod progress;
pub mod retention;
pub mod scanner;
pub mod stats;

pub use config::{AppConfig, ArchiveSettings};
pub use engine::ArchiveEngine;
pub use error::Error;
pub use model::{ArchiveMode, ArchiveScope, CandidateFile, CompressionKind, Group};
pub use progress::{ArchiveReporter, SilentReporter};
pub use retention::RetentionPolicy;
pub use stats::RunStatistics;
