pub mod builder;
pub mod delete;
pub mod verify;

use std::path::Path;

/// Final path component, which is also the entry name inside a container.
pub(crate) fn base_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
