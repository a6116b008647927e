use super::base_name;
use crate::error::Error;
use crate::model::{ArchiveRecord, CompressionKind, VerificationResult};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Reopen a closed container and check each embedded source against it.
///
/// A source is verified when the container holds an entry with its base name whose
/// uncompressed size equals the live file's current size. An `Err` means the
/// container itself could not be read; callers then treat every source as unverified.
pub fn verify_container(record: &ArchiveRecord) -> Result<VerificationResult, Error> {
    let entry_sizes = match record.kind {
        CompressionKind::Zip => zip_entry_sizes(&record.container)?,
        CompressionKind::Gzip => gzip_entry_sizes(&record.container)?,
    };

    let mut result = VerificationResult::new();
    for source in &record.sources {
        let verified = match (base_name(source), fs::metadata(source)) {
            (Some(name), Ok(metadata)) => entry_sizes.get(&name) == Some(&metadata.len()),
            (_, Err(err)) => {
                warn!("Cannot stat {} for verification: {}", source.display(), err);
                false
            }
            _ => false,
        };
        if !verified {
            warn!(
                "{} is not verified in {}",
                source.display(),
                record.container.display()
            );
        }
        result.set(source.clone(), verified);
    }

    debug!(
        "Verified {}/{} entries in {}",
        result.verified_count(),
        result.len(),
        record.container.display()
    );
    Ok(result)
}

/// Entry base name to uncompressed size. Later duplicates win.
pub fn zip_entry_sizes(container: &Path) -> Result<HashMap<String, u64>, Error> {
    let file = File::open(container)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let mut sizes = HashMap::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name();
        let base = name.rsplit('/').next().unwrap_or(name).to_string();
        sizes.insert(base, entry.size());
    }
    Ok(sizes)
}

/// The stored file name mapped to the decoded length of the stream.
pub fn gzip_entry_sizes(container: &Path) -> Result<HashMap<String, u64>, Error> {
    let file = File::open(container)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let size = io::copy(&mut decoder, &mut io::sink())?;

    let mut sizes = HashMap::new();
    if let Some(name) = decoder.header().and_then(|h| h.filename()) {
        sizes.insert(String::from_utf8_lossy(name).into_owned(), size);
    }
    Ok(sizes)
}
