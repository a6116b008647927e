pub mod walk;

pub use walk::{is_log_file, scan_log_files};
